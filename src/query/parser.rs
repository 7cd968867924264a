//! Recursive descent parser for query text.
//!
//! # Grammar
//!
//! ```text
//! query  := or
//! or     := and (OR and)*
//! and    := unary (AND unary)*
//! unary  := NOT unary | '(' or ')' | '*' | quant | cmp
//! cmp    := WORD op literal
//! quant  := (ANY | ALL) WORD '(' or ')' [WHERE '(' or ')']
//!         | COUNT WORD '(' or ')' [WHERE '(' or ')'] op INT
//! op     := '=' | '!=' | '<' | '<=' | '>' | '>='
//! literal:= QUOTED | INT | FLOAT | true | false | WORD
//! ```

use super::ast::{CmpOp, Quantifier, QueryExpr};
use super::lexer::{Lexer, Token};
use crate::error::{OlapError, Result};
use crate::types::Value;

/// Parse query text. Empty text matches everything.
pub fn parse_query(input: &str) -> Result<QueryExpr> {
    if input.trim().is_empty() {
        return Ok(QueryExpr::MatchAll);
    }
    QueryParser::new(input)?.parse()
}

pub struct QueryParser {
    lexer: Lexer,
    current: Token,
    /// Offset where `current` ends.
    position: usize,
}

impl QueryParser {
    pub fn new(input: &str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        let position = lexer.position();
        Ok(Self {
            lexer,
            current,
            position,
        })
    }

    pub fn parse(&mut self) -> Result<QueryExpr> {
        let expr = self.parse_or()?;
        if self.current != Token::Eof {
            return Err(self.unexpected("end of query"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<QueryExpr> {
        let mut parts = vec![self.parse_and()?];
        while self.current == Token::Or {
            self.advance()?;
            parts.push(self.parse_and()?);
        }
        Ok(collapse(parts, QueryExpr::Or))
    }

    fn parse_and(&mut self) -> Result<QueryExpr> {
        let mut parts = vec![self.parse_unary()?];
        while self.current == Token::And {
            self.advance()?;
            parts.push(self.parse_unary()?);
        }
        Ok(collapse(parts, QueryExpr::And))
    }

    fn parse_unary(&mut self) -> Result<QueryExpr> {
        match self.current.clone() {
            Token::Not => {
                self.advance()?;
                Ok(QueryExpr::Not(Box::new(self.parse_unary()?)))
            }
            Token::LeftParen => self.parse_group(),
            Token::Star => {
                self.advance()?;
                Ok(QueryExpr::MatchAll)
            }
            Token::Any => self.parse_quantifier(Quantifier::Any),
            Token::All => self.parse_quantifier(Quantifier::All),
            Token::Count => self.parse_quantifier(Quantifier::Count {
                op: CmpOp::Eq,
                n: 0,
            }),
            Token::Word(field) => {
                self.advance()?;
                let op = self.parse_op()?;
                let value = self.parse_literal()?;
                Ok(QueryExpr::Cmp { field, op, value })
            }
            _ => Err(self.unexpected("a condition")),
        }
    }

    fn parse_group(&mut self) -> Result<QueryExpr> {
        self.expect(Token::LeftParen, "'('")?;
        let expr = self.parse_or()?;
        self.expect(Token::RightParen, "')'")?;
        Ok(expr)
    }

    /// The COUNT threshold is parsed after the optional WHERE clause, so a
    /// placeholder quantifier is passed in and replaced.
    fn parse_quantifier(&mut self, quantifier: Quantifier) -> Result<QueryExpr> {
        self.advance()?;
        let link = match self.current.clone() {
            Token::Word(name) => name,
            _ => return Err(self.unexpected("a link name")),
        };
        self.advance()?;
        let inner = Box::new(self.parse_group()?);
        let filter = if self.current == Token::Where {
            self.advance()?;
            Some(Box::new(self.parse_group()?))
        } else {
            None
        };
        let quantifier = match quantifier {
            Quantifier::Count { .. } => {
                let op = self.parse_op()?;
                let n = match self.current {
                    Token::Int(n) if n >= 0 => n as u64,
                    _ => return Err(self.unexpected("a non-negative count")),
                };
                self.advance()?;
                Quantifier::Count { op, n }
            }
            other => other,
        };
        Ok(QueryExpr::Link {
            quantifier,
            link,
            inner,
            filter,
        })
    }

    fn parse_op(&mut self) -> Result<CmpOp> {
        let op = match self.current {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance()?;
        Ok(op)
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let value = match self.current.clone() {
            Token::Quoted(s) => Value::Str(s),
            Token::Int(n) => Value::Int(n),
            Token::Float(x) => Value::Float(x),
            Token::Word(w) if w == "true" => Value::Bool(true),
            Token::Word(w) if w == "false" => Value::Bool(false),
            Token::Word(w) => Value::Str(w),
            _ => return Err(self.unexpected("a value")),
        };
        self.advance()?;
        Ok(value)
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.current != token {
            return Err(self.unexpected(what));
        }
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        self.position = self.lexer.position();
        Ok(())
    }

    fn unexpected(&self, expected: &str) -> OlapError {
        let found = match &self.current {
            Token::Eof => "end of query".to_string(),
            other => format!("{:?}", other),
        };
        OlapError::InvalidQuery(format!(
            "expected {} but found {} near position {}",
            expected, found, self.position
        ))
    }
}

fn collapse(mut parts: Vec<QueryExpr>, combine: fn(Vec<QueryExpr>) -> QueryExpr) -> QueryExpr {
    if parts.len() == 1 {
        if let Some(only) = parts.pop() {
            return only;
        }
    }
    combine(parts)
}
