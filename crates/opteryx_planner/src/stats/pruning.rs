//! Predicate-driven blob pruning (§4.8): decide whether a blob can be
//! skipped entirely because its column statistics prove a predicate false
//! for every row it could contain.

use std::collections::HashMap;

use opteryx_types::{ColumnStatistics, DataType, Value};

use crate::expr::{ComparisonOperator, Expression, ExprKind};

use super::key::{has_unsafe_multibyte_prefix, to_int, NULL_FLAG};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub evaluated: usize,
    pub pruned: usize,
}

/// The pruning rule table from §4.8, applied to one bound `column OP
/// literal` comparison against one column's statistics.
pub fn evaluate_predicate(predicate: &Expression, column_type: &DataType, stats: &ColumnStatistics) -> bool {
    if column_type.is_temporal() {
        return false;
    }

    let ExprKind::ComparisonOp(op) = &predicate.kind else {
        return false;
    };
    if !op.is_prunable() {
        return false;
    }

    let Some(literal) = literal_operand(predicate) else {
        return false;
    };
    if literal.is_null() {
        return false;
    }

    if matches!(column_type, DataType::Varchar | DataType::Blob) {
        let bytes: &[u8] = match literal {
            Value::Varchar(s) => s.as_bytes(),
            Value::Blob(b) => b,
            _ => return false,
        };
        if has_unsafe_multibyte_prefix(bytes) {
            return false;
        }
    }

    let (Some(lower), Some(upper)) = (stats.lower_bound, stats.upper_bound) else {
        return false;
    };
    if lower == NULL_FLAG || upper == NULL_FLAG {
        return false;
    }

    let key = to_int(literal);
    if key == NULL_FLAG {
        return false;
    }

    match op {
        ComparisonOperator::Eq | ComparisonOperator::AnyOpEq => key < lower || key > upper,
        ComparisonOperator::NotEq => lower == upper && lower == key,
        ComparisonOperator::Gt => upper < key,
        ComparisonOperator::GtEq => upper <= key,
        ComparisonOperator::Lt => lower > key,
        ComparisonOperator::LtEq => lower >= key,
        _ => false,
    }
}

/// Pull the literal side out of a `column OP literal` (or `literal OP
/// column`) comparison; `None` if neither side is a bare literal.
fn literal_operand(predicate: &Expression) -> Option<&Value> {
    if let Some(ExprKind::Literal(v)) = predicate.right.as_deref().map(|e| &e.kind) {
        return Some(v);
    }
    if let Some(ExprKind::Literal(v)) = predicate.left.as_deref().map(|e| &e.kind) {
        return Some(v);
    }
    None
}

/// Evaluate every `(predicate, column type)` pair against each blob's
/// statistics (looked up via `stats_for`, keyed by the predicate's column
/// name from `column_of`), returning the surviving blobs and a count of how
/// many were evaluated/pruned.
pub fn prune_blobs<'a>(
    blobs: &'a [String],
    predicates: &[(Expression, DataType)],
    stats_for: impl Fn(&str) -> Option<HashMap<String, ColumnStatistics>>,
    column_of: impl Fn(&Expression) -> Option<String>,
) -> (Vec<&'a String>, PruneReport) {
    let mut survivors = Vec::new();
    let mut report = PruneReport::default();

    for blob in blobs {
        report.evaluated += 1;
        let Some(column_stats) = stats_for(blob) else {
            survivors.push(blob);
            continue;
        };

        let mut pruned = false;
        for (predicate, data_type) in predicates {
            let Some(column) = column_of(predicate) else { continue };
            let Some(stats) = column_stats.get(&column) else { continue };
            if evaluate_predicate(predicate, data_type, stats) {
                pruned = true;
                break;
            }
        }

        if pruned {
            report.pruned += 1;
        } else {
            survivors.push(blob);
        }
    }

    (survivors, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;

    fn stats(lower: i64, upper: i64) -> ColumnStatistics {
        ColumnStatistics {
            lower_bound: Some(lower),
            upper_bound: Some(upper),
            null_count: Some(0),
            cardinality_estimate: None,
        }
    }

    fn eq_predicate(literal: Value) -> Expression {
        Expression::comparison(
            ComparisonOperator::Eq,
            Expression::identifier("c", None),
            Expression::literal(literal),
        )
    }

    #[test]
    fn literal_outside_range_prunes() {
        let predicate = eq_predicate(Value::Integer(5));
        assert!(evaluate_predicate(&predicate, &DataType::Integer, &stats(10, 20)));
    }

    #[test]
    fn literal_inside_range_does_not_prune() {
        let predicate = eq_predicate(Value::Integer(15));
        assert!(!evaluate_predicate(&predicate, &DataType::Integer, &stats(10, 20)));
    }

    #[test]
    fn null_literal_never_prunes() {
        let predicate = eq_predicate(Value::Null);
        assert!(!evaluate_predicate(&predicate, &DataType::Integer, &stats(10, 20)));
    }

    #[test]
    fn temporal_columns_are_excluded() {
        let predicate = eq_predicate(Value::Integer(5));
        assert!(!evaluate_predicate(&predicate, &DataType::Date, &stats(10, 20)));
    }

    #[test]
    fn ascii_string_outside_range_prunes() {
        let predicate = eq_predicate(Value::Varchar("aardvark".to_string()));
        let bounds = stats(
            super::to_int(&Value::Varchar("alpha".to_string())),
            super::to_int(&Value::Varchar("omega".to_string())),
        );
        assert!(evaluate_predicate(&predicate, &DataType::Varchar, &bounds));
    }

    #[test]
    fn multibyte_literal_never_prunes() {
        let predicate = eq_predicate(Value::Varchar("β".to_string()));
        let bounds = stats(
            super::to_int(&Value::Varchar("alpha".to_string())),
            super::to_int(&Value::Varchar("omega".to_string())),
        );
        assert!(!evaluate_predicate(&predicate, &DataType::Varchar, &bounds));
    }
}
