//! AST-level rewriting: three passes applied to the parsed statement before
//! logical planning sees it.
//!
//! 1. [`resolve_temporal_bindings`] matches the `FOR` ranges the SQL
//!    rewriter extracted back onto the relations they belong to.
//! 2. [`bind_parameters`] substitutes `?`/`:name` placeholders with the
//!    caller-supplied values.
//! 3. [`fix_json_accessor_precedence`] normalizes `->`/`->>` chains to a
//!    left-deep shape regardless of how the parser associated them.

use std::collections::HashMap;
use std::ops::ControlFlow;

use opteryx_error::{OpteryxError, Result};
use opteryx_types::Value as OxValue;
use sqlparser::ast::{
    visit_expressions_mut, BinaryOperator, Expr, Query, Select, SetExpr, Statement, TableFactor,
    TableWithJoins, Value as SqlValue,
};

use super::sql_rewriter::TemporalRange;

/// Supplied query parameters: exactly one of positional or named is
/// populated, matching the mutual-exclusivity rule at the session layer.
#[derive(Debug, Clone, Default)]
pub enum ParameterSet {
    #[default]
    None,
    Positional(Vec<OxValue>),
    Named(HashMap<String, OxValue>),
}

/// Walk every `TableWithJoins` in every `SELECT` of the statement (through
/// set operations and nested subqueries) and match the `FOR` ranges back
/// onto their relation by alias-or-name, in document order. Every extracted
/// range must find a home; an orphaned range is a bug in the SQL rewriter
/// upstream; an unmatched relation simply has no temporal override.
pub fn resolve_temporal_bindings(
    statement: &Statement,
    ranges: Vec<TemporalRange>,
) -> Result<HashMap<String, TemporalRange>> {
    let mut identities = Vec::new();
    collect_relation_identities(statement, &mut identities);

    let mut bound = HashMap::new();
    for range in ranges {
        if identities.iter().any(|id| id == &range.relation_alias) {
            bound.insert(range.relation_alias.clone(), range);
        } else {
            return Err(OpteryxError::invalid_temporal_range(format!(
                "FOR clause references '{}' which does not match any relation in the query",
                range.relation_alias
            )));
        }
    }
    Ok(bound)
}

fn collect_relation_identities(statement: &Statement, out: &mut Vec<String>) {
    if let Statement::Query(query) = statement {
        collect_from_query(query, out);
    }
}

fn collect_from_query(query: &Query, out: &mut Vec<String>) {
    collect_from_set_expr(&query.body, out);
}

fn collect_from_set_expr(set_expr: &SetExpr, out: &mut Vec<String>) {
    match set_expr {
        SetExpr::Select(select) => collect_from_select(select, out),
        SetExpr::Query(q) => collect_from_query(q, out),
        SetExpr::SetOperation { left, right, .. } => {
            collect_from_set_expr(left, out);
            collect_from_set_expr(right, out);
        }
        _ => {}
    }
}

fn collect_from_select(select: &Select, out: &mut Vec<String>) {
    for twj in &select.from {
        collect_from_table_with_joins(twj, out);
    }
}

fn collect_from_table_with_joins(twj: &TableWithJoins, out: &mut Vec<String>) {
    collect_from_table_factor(&twj.relation, out);
    for join in &twj.joins {
        collect_from_table_factor(&join.relation, out);
    }
}

fn collect_from_table_factor(factor: &TableFactor, out: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let identity = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| name.to_string());
            out.push(identity);
        }
        TableFactor::Derived { subquery, alias, .. } => {
            collect_from_query(subquery, out);
            if let Some(alias) = alias {
                out.push(alias.name.value.clone());
            }
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_from_table_with_joins(table_with_joins, out),
        _ => {}
    }
}

/// Replace every placeholder expression with its bound value. Positional
/// placeholders (`?`, `$1`, ...) are consumed in appearance order; named
/// placeholders (`:name`) are looked up by name. Running out of positional
/// values, or referencing an unknown name, is a [`opteryx_error::ErrorKind::Parameter`]
/// error.
pub fn bind_parameters(statement: &mut Statement, params: &ParameterSet) -> Result<()> {
    let mut next_positional = 0usize;
    let mut err: Option<OpteryxError> = None;

    visit_expressions_mut(statement, |expr| {
        if let Expr::Value(SqlValue::Placeholder(token)) = expr {
            match resolve_placeholder(token, params, &mut next_positional) {
                Ok(value) => *expr = value_to_sql_expr(value),
                Err(e) => {
                    err = Some(e);
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });

    match err {
        Some(e) => Err(e),
        None => {
            if let ParameterSet::Positional(values) = params {
                if next_positional != values.len() {
                    return Err(OpteryxError::parameter(format!(
                        "{} parameters supplied but only {next_positional} placeholder(s) in the query",
                        values.len()
                    )));
                }
            }
            Ok(())
        }
    }
}

fn resolve_placeholder(
    token: &str,
    params: &ParameterSet,
    next_positional: &mut usize,
) -> Result<OxValue> {
    match params {
        ParameterSet::None => Err(OpteryxError::parameter(format!(
            "query has placeholder '{token}' but no parameters were supplied"
        ))),
        ParameterSet::Positional(values) => {
            let idx = *next_positional;
            *next_positional += 1;
            values.get(idx).cloned().ok_or_else(|| {
                OpteryxError::parameter(format!(
                    "not enough positional parameters: needed at least {}",
                    idx + 1
                ))
            })
        }
        ParameterSet::Named(map) => {
            let name = token.trim_start_matches([':', '@']);
            map.get(name).cloned().ok_or_else(|| {
                OpteryxError::parameter(format!("no value supplied for named parameter '{name}'"))
            })
        }
    }
}

fn value_to_sql_expr(value: OxValue) -> Expr {
    match value {
        OxValue::Boolean(b) => Expr::Value(SqlValue::Boolean(b)),
        OxValue::Integer(i) => Expr::Value(SqlValue::Number(i.to_string(), false)),
        OxValue::Double(d) => Expr::Value(SqlValue::Number(d.to_string(), false)),
        OxValue::Decimal(d) => Expr::Value(SqlValue::Number(d.to_string(), false)),
        OxValue::Varchar(s) => Expr::Value(SqlValue::SingleQuotedString(s)),
        OxValue::Null => Expr::Value(SqlValue::Null),
        other => Expr::Value(SqlValue::SingleQuotedString(other.to_string())),
    }
}

/// `a -> b -> c` style JSON path chains must associate left-to-right
/// (`(a -> b) -> c`) regardless of how the grammar's generic binary-operator
/// precedence climbing nested them, and `document -> 'element' = 'value'`
/// must bind as `(document -> 'element') = 'value'` rather than
/// `document -> ('element' = 'value')` -- the grammar gives JSON accessors
/// lower precedence than comparison, so it parses the latter unless this
/// pass re-associates it.
pub fn fix_json_accessor_precedence(statement: &mut Statement) {
    visit_expressions_mut(statement, |expr| {
        rotate_if_right_leaning(expr);
        ControlFlow::<()>::Continue(())
    });
}

fn is_json_operator(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Arrow
            | BinaryOperator::LongArrow
            | BinaryOperator::HashArrow
            | BinaryOperator::HashLongArrow
            | BinaryOperator::AtArrow
            | BinaryOperator::AtQuestion
    )
}

fn is_comparison_operator(op: &BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq
    )
}

/// `a OP (b CMP c)` where `OP` is a JSON accessor and `CMP` is a comparison,
/// `LIKE`/`ILIKE` family, or `IS ...` predicate becomes `(a OP b) CMP c` --
/// the accessor binds to its immediate element, and the predicate re-applies
/// to the accessor's result. Chains of JSON accessors (`OP` and the nested
/// operator both JSON) are re-associated the same way.
fn rotate_if_right_leaning(expr: &mut Expr) {
    if let Expr::BinaryOp { left, op, right } = expr {
        if is_json_operator(op) {
            if let Some(rotated) = try_rotate(left, op, right) {
                *expr = rotated;
                rotate_if_right_leaning(expr);
            }
        }
    }
}

fn try_rotate(left: &Expr, op: &BinaryOperator, right: &Expr) -> Option<Expr> {
    match right {
        Expr::BinaryOp { left: inner_left, op: inner_op, .. }
            if is_json_operator(inner_op) || is_comparison_operator(inner_op) =>
        {
            let combined = Expr::BinaryOp {
                left: Box::new(left.clone()),
                op: op.clone(),
                right: inner_left.clone(),
            };
            let mut rotated = right.clone();
            if let Expr::BinaryOp { left: slot, .. } = &mut rotated {
                *slot = Box::new(combined);
            }
            Some(rotated)
        }
        Expr::Like { expr: inner, .. } | Expr::ILike { expr: inner, .. } => {
            let combined = Expr::BinaryOp {
                left: Box::new(left.clone()),
                op: op.clone(),
                right: inner.clone(),
            };
            let mut rotated = right.clone();
            match &mut rotated {
                Expr::Like { expr: slot, .. } | Expr::ILike { expr: slot, .. } => {
                    *slot = Box::new(combined);
                }
                _ => unreachable!("matched Like/ILike above"),
            }
            Some(rotated)
        }
        Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsNotTrue(inner)
        | Expr::IsFalse(inner)
        | Expr::IsNotFalse(inner) => {
            let combined = Expr::BinaryOp {
                left: Box::new(left.clone()),
                op: op.clone(),
                right: inner.clone(),
            };
            let mut rotated = right.clone();
            match &mut rotated {
                Expr::IsNull(slot)
                | Expr::IsNotNull(slot)
                | Expr::IsTrue(slot)
                | Expr::IsNotTrue(slot)
                | Expr::IsFalse(slot)
                | Expr::IsNotFalse(slot) => {
                    *slot = Box::new(combined);
                }
                _ => unreachable!("matched an Is-predicate above"),
            }
            Some(rotated)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse(sql: &str) -> Statement {
        Parser::parse_sql(&GenericDialect {}, sql).unwrap().remove(0)
    }

    #[test]
    fn resolves_temporal_binding_by_alias() {
        let stmt = parse("SELECT * FROM $planets p");
        let ranges = vec![TemporalRange {
            relation_alias: "p".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
        }];
        let bound = resolve_temporal_bindings(&stmt, ranges).unwrap();
        assert!(bound.contains_key("p"));
    }

    #[test]
    fn orphaned_temporal_range_is_an_error() {
        let stmt = parse("SELECT * FROM $planets");
        let ranges = vec![TemporalRange {
            relation_alias: "$nope".to_string(),
            start_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
        }];
        assert!(resolve_temporal_bindings(&stmt, ranges).is_err());
    }

    #[test]
    fn binds_positional_parameters_in_order() {
        let mut stmt = parse("SELECT * FROM $planets WHERE a = ? AND b = ?");
        let params = ParameterSet::Positional(vec![OxValue::Integer(1), OxValue::Integer(2)]);
        bind_parameters(&mut stmt, &params).unwrap();
        assert!(!stmt.to_string().contains('?'));
    }

    #[test]
    fn rejects_mismatched_positional_parameter_count() {
        let mut stmt = parse("SELECT * FROM $planets WHERE a = ?");
        let params = ParameterSet::Positional(vec![OxValue::Integer(1), OxValue::Integer(2)]);
        assert!(bind_parameters(&mut stmt, &params).is_err());
    }

    fn where_clause(stmt: &Statement) -> Expr {
        match stmt {
            Statement::Query(query) => match query.body.as_ref() {
                SetExpr::Select(select) => select.selection.clone().expect("query has a WHERE clause"),
                _ => panic!("expected a SELECT"),
            },
            _ => panic!("expected a query"),
        }
    }

    #[test]
    fn json_accessor_binds_tighter_than_a_trailing_comparison() {
        let mut stmt = parse("SELECT * FROM $planets WHERE document -> 'element' = 'value'");
        fix_json_accessor_precedence(&mut stmt);
        match where_clause(&stmt) {
            Expr::BinaryOp { left, op, right } => {
                assert_eq!(op, BinaryOperator::Eq);
                assert!(matches!(right.as_ref(), Expr::Value(SqlValue::SingleQuotedString(s)) if s == "value"));
                match left.as_ref() {
                    Expr::BinaryOp { op: inner_op, .. } => assert_eq!(*inner_op, BinaryOperator::Arrow),
                    other => panic!("expected the accessor to survive as the new left operand, got {other:?}"),
                }
            }
            other => panic!("expected a top-level comparison, got {other:?}"),
        }
    }
}
