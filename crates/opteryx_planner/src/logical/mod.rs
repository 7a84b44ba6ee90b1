//! Logical plan data model and the planner that builds it from a parsed
//! statement.

pub mod builders;
pub mod plan;
pub mod planner;

pub use plan::{JoinType, LogicalPlan, PlanNode, SetOpKind, SetVariant};
pub use planner::plan_statement;
