//! Tokenizer for query text.

use crate::error::{OlapError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Field name, link name or bare-word literal.
    Word(String),
    /// Single- or double-quoted string.
    Quoted(String),
    Int(i64),
    Float(f64),

    And,
    Or,
    Not,
    Any,
    All,
    Count,
    Where,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Star,
    LeftParen,
    RightParen,

    Eof,
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Character offset of the next unread character.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '(' => {
                self.position += 1;
                Ok(Token::LeftParen)
            }
            ')' => {
                self.position += 1;
                Ok(Token::RightParen)
            }
            '*' => {
                self.position += 1;
                Ok(Token::Star)
            }
            '=' => {
                self.position += 1;
                Ok(Token::Eq)
            }
            '!' => {
                self.position += 1;
                if self.eat('=') {
                    Ok(Token::Ne)
                } else {
                    Err(self.error("expected '=' after '!'"))
                }
            }
            '<' => {
                self.position += 1;
                Ok(if self.eat('=') { Token::Le } else { Token::Lt })
            }
            '>' => {
                self.position += 1;
                Ok(if self.eat('=') { Token::Ge } else { Token::Gt })
            }
            '"' | '\'' => {
                self.position += 1;
                self.read_quoted(ch)
            }
            '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            _ if ch.is_ascii_digit() => self.read_number(),
            _ if is_word_char(ch) => Ok(self.read_word()),
            _ => Err(self.error(&format!("unexpected character '{}'", ch))),
        }
    }

    fn read_quoted(&mut self, quote: char) -> Result<Token> {
        let start = self.position;
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            self.position += 1;
            match ch {
                '\\' => match self.peek() {
                    Some(escaped) => {
                        out.push(escaped);
                        self.position += 1;
                    }
                    None => break,
                },
                _ if ch == quote => return Ok(Token::Quoted(out)),
                _ => out.push(ch),
            }
        }
        Err(OlapError::InvalidQuery(format!(
            "unterminated string starting at position {}",
            start.saturating_sub(1)
        )))
    }

    /// Numbers may run into word characters (`2024-01`, `10abc`); such
    /// tokens are bare words.
    fn read_number(&mut self) -> Result<Token> {
        let start = self.position;
        if self.peek() == Some('-') {
            self.position += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.position += 1;
        }
        if self.peek().is_some_and(is_word_char) {
            self.position = start;
            return Ok(self.read_word());
        }
        let text: String = self.input[start..self.position].iter().collect();
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Token::Int(n));
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| OlapError::InvalidQuery(format!("bad number '{}' at position {}", text, start)))
    }

    fn read_word(&mut self) -> Token {
        let start = self.position;
        while self.peek().is_some_and(is_word_char) {
            self.position += 1;
        }
        let word: String = self.input[start..self.position].iter().collect();
        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "ANY" => Token::Any,
            "ALL" => Token::All,
            "COUNT" => Token::Count,
            "WHERE" => Token::Where,
            _ => Token::Word(word),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, msg: &str) -> OlapError {
        OlapError::InvalidQuery(format!("{} at position {}", msg, self.position))
    }
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | ':' | '/' | '@')
}
