//! SQL compilation pipeline: rewrite a parsed statement, plan it into a
//! logical DAG, and bind that DAG against a schema source.
//!
//! ```text
//! SQL text -> sql_rewriter -> sqlparser -> ast_rewriter -> logical::planner -> binder
//! ```
//!
//! Heuristic optimization and physical execution live downstream of this
//! crate and are out of scope.

pub mod binder;
pub mod connector;
pub mod expr;
pub mod functions;
pub mod graph;
pub mod logical;
pub mod rewrite;
pub mod session;
pub mod stats;

#[cfg(test)]
mod tests;

pub use binder::{bind_plan, BindingContext, SchemaProvider};
pub use connector::{Connector, ConnectorRegistry};
pub use expr::Expression;
pub use functions::FunctionCatalogue;
pub use graph::Graph;
pub use logical::{plan_statement, LogicalPlan, PlanNode};
pub use rewrite::{ast_rewriter, rewrite_sql, sql_rewriter, TemporalRange};
pub use session::{Session, SystemVariables};
