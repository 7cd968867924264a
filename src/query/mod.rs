//! Query text, its parsed and executable forms, and request-level rewrites
//! (pair placeholders, shard selection).

pub mod ast;
pub mod docset;
pub mod eval;
pub mod lexer;
pub mod pair;
pub mod parser;
pub mod shards;

pub use ast::{CmpOp, Quantifier, QueryExpr};
pub use docset::DocSet;
pub use eval::{matches_literal, LinkSet, Query};
pub use pair::{rewrite_query, Pair};
pub use parser::parse_query;
pub use shards::{get_shards_list, ShardSelector};
