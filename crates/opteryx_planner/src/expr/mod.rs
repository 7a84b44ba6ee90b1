//! Expression tree.
//!
//! A query's scalar expressions (projection items, predicates, join
//! conditions, group keys...) are represented as a tagged tree of
//! [`Expression`] nodes. Each node owns up to three children plus an ordered
//! list of `parameters` (used for function call arguments); leaves are plain
//! values. A parent exclusively owns its children -- there is no sharing.
//!
//! Binding (see `opteryx_planner::binder`) fills in `schema_column` and
//! `query_column` in place, walking a deep copy of the tree so peer branches
//! never observe each other's partial updates.

pub mod display;

use opteryx_types::{ColumnId, DataType, Value};

use crate::logical::plan::LogicalPlan;

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    StringConcat,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::StringConcat => "||",
            Self::BitwiseAnd => "&",
            Self::BitwiseOr => "|",
            Self::BitwiseXor => "^",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
        }
    }
}

/// Comparison and pattern-matching operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    ILike,
    NotLike,
    NotILike,
    InList,
    NotInList,
    InSubQuery,
    NotInSubQuery,
    /// `literal = ANY(array_column)`.
    AnyOpEq,
}

impl ComparisonOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::NotLike => "NOT LIKE",
            Self::NotILike => "NOT ILIKE",
            Self::InList => "IN",
            Self::NotInList => "NOT IN",
            Self::InSubQuery => "IN",
            Self::NotInSubQuery => "NOT IN",
            Self::AnyOpEq => "= ANY",
        }
    }

    /// Whether this operator is eligible for the blob-pruning rule table in
    /// §4.8. Pattern-matching and subquery membership are not.
    pub fn is_prunable(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Gt | Self::GtEq | Self::Lt | Self::LtEq | Self::AnyOpEq
        )
    }
}

/// Unary operators, including the `IS ...` predicate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    /// Optional source qualifier, e.g. `a` in `a.name`.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Identifier(Identifier),
    Literal(Value),
    /// A scalar function call. Arguments live in `Expression::parameters`.
    Function { name: String },
    /// An aggregate function call, tagged separately so the planner can pull
    /// it up into an `Aggregate`/`AggregateAndGroup` node.
    Aggregator { name: String },
    BinaryOp(BinaryOperator),
    ComparisonOp(ComparisonOperator),
    UnaryOp(UnaryOperator),
    And,
    Or,
    Xor,
    Not,
    /// A parenthesized sub-expression; the wrapped expression is `centre`.
    Nested,
    /// `*` or `relation.*`.
    Wildcard { qualifier: Option<String> },
    /// An uncorrelated or correlated scalar/IN subquery.
    Subquery(Box<LogicalPlan>),
    /// A bare list of expressions (`IN (a, b, c)`, `CASE` condition/result
    /// lists).
    ExpressionList,
    /// Marks an expression that was already computed upstream of where it's
    /// referenced (inserted by the binder when rewriting a constant-folded
    /// function call to its literal result).
    Evaluated,
}

/// A node in the expression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExprKind,
    pub left: Option<Box<Expression>>,
    pub right: Option<Box<Expression>>,
    pub centre: Option<Box<Expression>>,
    pub parameters: Vec<Expression>,
    pub alias: Option<String>,
    /// Filled in by the binder: the schema column this expression resolves
    /// to (an existing column for `Identifier`, or a freshly synthesized
    /// `$derived` column otherwise).
    pub schema_column: Option<ColumnId>,
    /// Filled in by the binder: the display name used downstream (alias,
    /// bare name, or qualified `relation.column` form).
    pub query_column: Option<String>,
    /// Filled in by the binder's type inference.
    pub data_type: DataType,
}

impl Expression {
    pub fn new(kind: ExprKind) -> Self {
        Expression {
            kind,
            left: None,
            right: None,
            centre: None,
            parameters: Vec::new(),
            alias: None,
            schema_column: None,
            query_column: None,
            data_type: DataType::Missing,
        }
    }

    pub fn identifier(name: impl Into<String>, source: Option<String>) -> Self {
        Self::new(ExprKind::Identifier(Identifier {
            name: name.into(),
            source,
        }))
    }

    pub fn literal(value: Value) -> Self {
        let data_type = value.data_type();
        let mut expr = Self::new(ExprKind::Literal(value));
        expr.data_type = data_type;
        expr
    }

    pub fn wildcard(qualifier: Option<String>) -> Self {
        Self::new(ExprKind::Wildcard { qualifier })
    }

    pub fn with_left(mut self, left: Expression) -> Self {
        self.left = Some(Box::new(left));
        self
    }

    pub fn with_right(mut self, right: Expression) -> Self {
        self.right = Some(Box::new(right));
        self
    }

    pub fn with_centre(mut self, centre: Expression) -> Self {
        self.centre = Some(Box::new(centre));
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<Expression>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::BinaryOp(op)).with_left(left).with_right(right)
    }

    pub fn comparison(op: ComparisonOperator, left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::ComparisonOp(op)).with_left(left).with_right(right)
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::And).with_left(left).with_right(right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::new(ExprKind::Or).with_left(left).with_right(right)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::new(ExprKind::Function { name: name.into() }).with_parameters(args)
    }

    pub fn is_bound(&self) -> bool {
        self.schema_column.is_some()
    }

    pub fn is_aggregator(&self) -> bool {
        matches!(self.kind, ExprKind::Aggregator { .. })
    }

    /// Returns the expression's immediate children in `left, right, centre,
    /// parameters...` order -- the uniform accessor the binder's post-order
    /// recursion walks over, regardless of variant.
    pub fn children(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        if let Some(l) = &self.left {
            out.push(l.as_ref());
        }
        if let Some(r) = &self.right {
            out.push(r.as_ref());
        }
        if let Some(c) = &self.centre {
            out.push(c.as_ref());
        }
        out.extend(self.parameters.iter());
        out
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expression> {
        let mut out = Vec::new();
        if let Some(l) = &mut self.left {
            out.push(l.as_mut());
        }
        if let Some(r) = &mut self.right {
            out.push(r.as_mut());
        }
        if let Some(c) = &mut self.centre {
            out.push(c.as_mut());
        }
        out.extend(self.parameters.iter_mut());
        out
    }

    /// Depth-first pre-order walk, visiting `self` before its children.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expression)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_collects_left_right_centre_and_parameters() {
        let expr = Expression::comparison(
            ComparisonOperator::Eq,
            Expression::identifier("a", None),
            Expression::literal(Value::Integer(1)),
        );
        assert_eq!(expr.children().len(), 2);
    }

    #[test]
    fn walk_visits_every_node_exactly_once() {
        let expr = Expression::and(
            Expression::comparison(
                ComparisonOperator::Gt,
                Expression::identifier("a", None),
                Expression::literal(Value::Integer(1)),
            ),
            Expression::comparison(
                ComparisonOperator::Lt,
                Expression::identifier("b", None),
                Expression::literal(Value::Integer(2)),
            ),
        );
        let mut count = 0;
        expr.walk(&mut |_| count += 1);
        assert_eq!(count, 7);
    }
}
