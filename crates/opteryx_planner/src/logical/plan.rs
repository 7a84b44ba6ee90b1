//! Logical plan nodes and the DAG that holds them.

use std::fmt;

use opteryx_types::RelationSchema;

use crate::expr::Expression;
use crate::graph::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    LeftSemi,
    RightSemi,
    LeftAnti,
    RightAnti,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT OUTER",
            Self::Right => "RIGHT OUTER",
            Self::Full => "FULL OUTER",
            Self::Cross => "CROSS",
            Self::LeftSemi => "LEFT SEMI",
            Self::RightSemi => "RIGHT SEMI",
            Self::LeftAnti => "LEFT ANTI",
            Self::RightAnti => "RIGHT ANTI",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Difference,
}

/// The kind of synthetic dataset produced by a `FunctionDataset` node.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionDatasetKind {
    Values(Vec<Vec<Expression>>),
    Unnest(Expression),
    GenerateSeries { start: Expression, stop: Expression, step: Option<Expression> },
    Fake { rows: Expression, seed: Option<Expression> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetVariant {
    Variable { name: String, value: Expression },
}

/// A step in the logical query plan.
///
/// Every variant stores the fields specific to it. Post-binding, `columns`
/// (where present) records the set of identifier expressions the node
/// references, which is the contract the downstream heuristic optimizer
/// relies on for predicate pushdown and column pruning (§4.10).
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan {
        dataset: String,
        alias: String,
        start_date: Option<chrono::NaiveDate>,
        end_date: Option<chrono::NaiveDate>,
        schema: Option<RelationSchema>,
        hints: Vec<String>,
    },
    Filter {
        condition: Expression,
    },
    Project {
        columns: Vec<Expression>,
        /// Columns referenced only by `ORDER BY`, retained for the executor
        /// but not part of the visible output shape.
        order_only_columns: Vec<Expression>,
    },
    Join {
        join_type: JoinType,
        condition: Option<Expression>,
        using: Vec<String>,
    },
    AggregateAndGroup {
        groups: Vec<Expression>,
        aggregates: Vec<Expression>,
        projection: Vec<Expression>,
    },
    Aggregate {
        aggregates: Vec<Expression>,
    },
    Distinct {
        on: Option<Vec<Expression>>,
    },
    Order {
        columns: Vec<(Expression, bool, bool)>, // expr, desc, nulls_first
    },
    Limit {
        limit: Option<u64>,
        offset: Option<u64>,
    },
    HeapSort {
        columns: Vec<(Expression, bool, bool)>,
        limit: u64,
    },
    Union {
        distinct: bool,
    },
    Difference,
    Exit {
        columns: Vec<Expression>,
    },
    Cte {
        alias: String,
    },
    Subquery {
        alias: String,
    },
    FunctionDataset {
        alias: String,
        kind: FunctionDatasetKind,
    },
    Show {
        target: String,
    },
    ShowColumns {
        relation: String,
        full: bool,
        extended: bool,
    },
    Set {
        variant: SetVariant,
    },
    Explain {
        analyze: bool,
    },
    MetadataWriter {
        dataset: String,
    },
}

impl PlanNode {
    pub fn label(&self) -> &'static str {
        match self {
            PlanNode::Scan { .. } => "Scan",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Project { .. } => "Project",
            PlanNode::Join { .. } => "Join",
            PlanNode::AggregateAndGroup { .. } => "AggregateAndGroup",
            PlanNode::Aggregate { .. } => "Aggregate",
            PlanNode::Distinct { .. } => "Distinct",
            PlanNode::Order { .. } => "Order",
            PlanNode::Limit { .. } => "Limit",
            PlanNode::HeapSort { .. } => "HeapSort",
            PlanNode::Union { .. } => "Union",
            PlanNode::Difference => "Difference",
            PlanNode::Exit { .. } => "Exit",
            PlanNode::Cte { .. } => "CTE",
            PlanNode::Subquery { .. } => "Subquery",
            PlanNode::FunctionDataset { .. } => "FunctionDataset",
            PlanNode::Show { .. } => "Show",
            PlanNode::ShowColumns { .. } => "ShowColumns",
            PlanNode::Set { .. } => "Set",
            PlanNode::Explain { .. } => "Explain",
            PlanNode::MetadataWriter { .. } => "MetadataWriter",
        }
    }
}

/// A query plan: a DAG of [`PlanNode`]s with exactly one exit point.
#[derive(Debug, Clone, Default)]
pub struct LogicalPlan {
    pub graph: Graph<PlanNode>,
    next_id: u64,
}

impl LogicalPlan {
    pub fn new() -> Self {
        LogicalPlan::default()
    }

    /// Mint a fresh, monotonically-increasing node identity.
    pub fn fresh_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_node(&mut self, prefix: &str, node: PlanNode) -> String {
        let id = self.fresh_id(prefix);
        self.graph.add_node(id.clone(), node);
        id
    }

    pub fn exit_id(&self) -> opteryx_error::Result<&str> {
        self.graph.exit_point()
    }

    pub fn post_order(&self) -> opteryx_error::Result<Vec<String>> {
        Ok(self
            .graph
            .post_order_from(self.exit_id()?)
            .into_iter()
            .map(|s| s.to_string())
            .collect())
    }
}
