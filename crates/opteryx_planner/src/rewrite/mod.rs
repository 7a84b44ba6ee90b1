//! The text- and AST-level rewriting stages that run ahead of logical
//! planning.

pub mod ast_rewriter;
pub mod sql_rewriter;

pub use sql_rewriter::{rewrite as rewrite_sql, TemporalRange};
