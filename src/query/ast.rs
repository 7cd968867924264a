//! Parsed query text.

use std::cmp::Ordering;
use std::fmt;

use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn test(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        }
    }

    pub fn test_count(self, count: u64, threshold: u64) -> bool {
        self.test(count.cmp(&threshold))
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    Count { op: CmpOp, n: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// `*`
    MatchAll,
    Cmp {
        field: String,
        op: CmpOp,
        value: Value,
    },
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
    Not(Box<QueryExpr>),
    /// Quantifier over the entities a link field reaches.
    Link {
        quantifier: Quantifier,
        link: String,
        inner: Box<QueryExpr>,
        filter: Option<Box<QueryExpr>>,
    },
}

impl QueryExpr {
    pub fn cmp(field: &str, op: CmpOp, value: impl Into<Value>) -> Self {
        QueryExpr::Cmp {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    /// True if any quantifier appears in the expression.
    pub fn has_links(&self) -> bool {
        match self {
            QueryExpr::MatchAll | QueryExpr::Cmp { .. } => false,
            QueryExpr::And(parts) | QueryExpr::Or(parts) => parts.iter().any(|p| p.has_links()),
            QueryExpr::Not(inner) => inner.has_links(),
            QueryExpr::Link { .. } => true,
        }
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpr::MatchAll => write!(f, "*"),
            QueryExpr::Cmp { field, op, value } => match value {
                Value::Str(s) => write!(f, "{}{}{:?}", field, op.symbol(), s),
                other => write!(f, "{}{}{}", field, op.symbol(), other),
            },
            QueryExpr::And(parts) => write_joined(f, parts, " AND "),
            QueryExpr::Or(parts) => write_joined(f, parts, " OR "),
            QueryExpr::Not(inner) => write!(f, "NOT ({})", inner),
            QueryExpr::Link {
                quantifier,
                link,
                inner,
                filter,
            } => {
                match quantifier {
                    Quantifier::Any => write!(f, "ANY {}({})", link, inner)?,
                    Quantifier::All => write!(f, "ALL {}({})", link, inner)?,
                    Quantifier::Count { .. } => write!(f, "COUNT {}({})", link, inner)?,
                }
                if let Some(filter) = filter {
                    write!(f, " WHERE ({})", filter)?;
                }
                if let Quantifier::Count { op, n } = quantifier {
                    write!(f, " {} {}", op.symbol(), n)?;
                }
                Ok(())
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[QueryExpr], sep: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({})", part)?;
    }
    Ok(())
}
