//! AST-node-kind -> [`Expression`]-builder dispatch table.
//!
//! Everything here is pure translation: no schema is consulted and no
//! `schema_column`/`data_type` fields are filled in except the literal type
//! of a constant. Binding happens later, over the tree this module builds.

use opteryx_error::{OpteryxError, Result};
use opteryx_types::{DataType, Value as OxValue};
use rust_decimal::Decimal;
use sqlparser::ast::{
    BinaryOperator as SqlBinaryOperator, DataType as SqlDataType, Expr as SqlExpr, FunctionArg,
    FunctionArgExpr, Ident, ObjectName, OrderByExpr, Query, SelectItem,
    UnaryOperator as SqlUnaryOperator, Value as SqlValue,
};
use std::str::FromStr;

use crate::expr::{BinaryOperator, ComparisonOperator, Expression, ExprKind, UnaryOperator};
use crate::logical::plan::LogicalPlan;

/// Callback the planner supplies so builders can recursively plan a
/// correlated or uncorrelated subquery without `logical::builders` needing
/// to depend on `logical::planner` (which depends back on this module).
pub trait SubqueryPlanner {
    fn plan_subquery(&mut self, query: &Query) -> Result<LogicalPlan>;
}

pub fn build_expr(expr: &SqlExpr, planner: &mut dyn SubqueryPlanner) -> Result<Expression> {
    match expr {
        SqlExpr::Identifier(ident) => Ok(Expression::identifier(ident.value.clone(), None)),
        SqlExpr::CompoundIdentifier(parts) => Ok(build_compound_identifier(parts)),
        SqlExpr::Value(v) => Ok(Expression::literal(map_sql_value(v)?)),
        SqlExpr::Nested(inner) => Ok(Expression::new(ExprKind::Nested)
            .with_centre(build_expr(inner, planner)?)),
        SqlExpr::UnaryOp { op, expr } => build_unary_op(op, expr, planner),
        SqlExpr::BinaryOp { left, op, right } => build_binary_op(left, op, right, planner),
        SqlExpr::IsNull(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsNull))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::IsNotNull(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsNotNull))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::IsTrue(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsTrue))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::IsNotTrue(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsNotTrue))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::IsFalse(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsFalse))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::IsNotFalse(inner) => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::IsNotFalse))
            .with_left(build_expr(inner, planner)?)),
        SqlExpr::Between { expr, negated, low, high } => {
            build_between(expr, *negated, low, high, planner)
        }
        SqlExpr::InList { expr, list, negated } => build_in_list(expr, list, *negated, planner),
        SqlExpr::InSubquery { expr, subquery, negated } => {
            build_in_subquery(expr, subquery, *negated, planner)
        }
        SqlExpr::Like { negated, expr, pattern, .. } => Ok(Expression::new(ExprKind::ComparisonOp(
            if *negated { ComparisonOperator::NotLike } else { ComparisonOperator::Like },
        ))
        .with_left(build_expr(expr, planner)?)
        .with_right(build_expr(pattern, planner)?)),
        SqlExpr::ILike { negated, expr, pattern, .. } => Ok(Expression::new(ExprKind::ComparisonOp(
            if *negated { ComparisonOperator::NotILike } else { ComparisonOperator::ILike },
        ))
        .with_left(build_expr(expr, planner)?)
        .with_right(build_expr(pattern, planner)?)),
        SqlExpr::Function(func) => build_function_call(func, planner),
        SqlExpr::Cast { expr, data_type, .. } => {
            let mut call = Expression::function("CAST", vec![build_expr(expr, planner)?]);
            call.data_type = map_sql_datatype(data_type)?;
            Ok(call)
        }
        SqlExpr::Case { operand, conditions, results, else_result } => {
            build_case(operand, conditions, results, else_result, planner)
        }
        SqlExpr::Exists { subquery, negated } => {
            let name = if *negated { "NOT_EXISTS" } else { "EXISTS" };
            let plan = planner.plan_subquery(subquery)?;
            let sub = Expression::new(ExprKind::Subquery(Box::new(plan)));
            Ok(Expression::function(name, vec![sub]))
        }
        SqlExpr::Subquery(query) => {
            let plan = planner.plan_subquery(query)?;
            Ok(Expression::new(ExprKind::Subquery(Box::new(plan))))
        }
        SqlExpr::Tuple(items) => {
            let parameters = items
                .iter()
                .map(|e| build_expr(e, planner))
                .collect::<Result<Vec<_>>>()?;
            Ok(Expression::new(ExprKind::ExpressionList).with_parameters(parameters))
        }
        SqlExpr::Wildcard => Ok(Expression::wildcard(None)),
        SqlExpr::QualifiedWildcard(name) => Ok(Expression::wildcard(Some(object_name_to_string(name)))),
        other => Err(OpteryxError::unsupported(format!(
            "expression not supported: {other}"
        ))),
    }
}

fn build_compound_identifier(parts: &[Ident]) -> Expression {
    if parts.len() <= 1 {
        return Expression::identifier(
            parts.first().map(|i| i.value.clone()).unwrap_or_default(),
            None,
        );
    }
    let source = parts[..parts.len() - 1]
        .iter()
        .map(|i| i.value.as_str())
        .collect::<Vec<_>>()
        .join(".");
    Expression::identifier(parts[parts.len() - 1].value.clone(), Some(source))
}

fn object_name_to_string(name: &ObjectName) -> String {
    name.0.iter().map(|i| i.value.as_str()).collect::<Vec<_>>().join(".")
}

fn build_unary_op(
    op: &SqlUnaryOperator,
    expr: &SqlExpr,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    match op {
        SqlUnaryOperator::Minus => Ok(Expression::new(ExprKind::UnaryOp(UnaryOperator::Negate))
            .with_left(build_expr(expr, planner)?)),
        SqlUnaryOperator::Plus => build_expr(expr, planner),
        SqlUnaryOperator::Not => {
            Ok(Expression::new(ExprKind::Not).with_centre(build_expr(expr, planner)?))
        }
        other => Err(OpteryxError::unsupported(format!("unary operator {other} not supported"))),
    }
}

fn build_binary_op(
    left: &SqlExpr,
    op: &SqlBinaryOperator,
    right: &SqlExpr,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let l = build_expr(left, planner)?;
    let r = build_expr(right, planner)?;

    if let SqlBinaryOperator::And = op {
        return Ok(Expression::and(l, r));
    }
    if let SqlBinaryOperator::Or = op {
        return Ok(Expression::or(l, r));
    }
    if let SqlBinaryOperator::Xor = op {
        return Ok(Expression::new(ExprKind::Xor).with_left(l).with_right(r));
    }

    if let Some(cmp) = map_comparison_operator(op) {
        return Ok(Expression::comparison(cmp, l, r));
    }
    if let Some(bin) = map_binary_operator(op) {
        return Ok(Expression::binary(bin, l, r));
    }

    Err(OpteryxError::unsupported(format!("binary operator {op} not supported")))
}

fn map_comparison_operator(op: &SqlBinaryOperator) -> Option<ComparisonOperator> {
    Some(match op {
        SqlBinaryOperator::Eq => ComparisonOperator::Eq,
        SqlBinaryOperator::NotEq => ComparisonOperator::NotEq,
        SqlBinaryOperator::Lt => ComparisonOperator::Lt,
        SqlBinaryOperator::LtEq => ComparisonOperator::LtEq,
        SqlBinaryOperator::Gt => ComparisonOperator::Gt,
        SqlBinaryOperator::GtEq => ComparisonOperator::GtEq,
        _ => return None,
    })
}

fn map_binary_operator(op: &SqlBinaryOperator) -> Option<BinaryOperator> {
    Some(match op {
        SqlBinaryOperator::Plus => BinaryOperator::Add,
        SqlBinaryOperator::Minus => BinaryOperator::Subtract,
        SqlBinaryOperator::Multiply => BinaryOperator::Multiply,
        SqlBinaryOperator::Divide => BinaryOperator::Divide,
        SqlBinaryOperator::Modulo => BinaryOperator::Modulo,
        SqlBinaryOperator::StringConcat => BinaryOperator::StringConcat,
        SqlBinaryOperator::BitwiseAnd => BinaryOperator::BitwiseAnd,
        SqlBinaryOperator::BitwiseOr => BinaryOperator::BitwiseOr,
        SqlBinaryOperator::BitwiseXor => BinaryOperator::BitwiseXor,
        SqlBinaryOperator::PGBitwiseShiftLeft => BinaryOperator::ShiftLeft,
        SqlBinaryOperator::PGBitwiseShiftRight => BinaryOperator::ShiftRight,
        _ => return None,
    })
}

fn build_between(
    expr: &SqlExpr,
    negated: bool,
    low: &SqlExpr,
    high: &SqlExpr,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let target = build_expr(expr, planner)?;
    let lower = Expression::comparison(ComparisonOperator::GtEq, target.clone(), build_expr(low, planner)?);
    let upper = Expression::comparison(ComparisonOperator::LtEq, target, build_expr(high, planner)?);
    let conjunction = Expression::and(lower, upper);
    Ok(if negated {
        Expression::new(ExprKind::Not).with_centre(conjunction)
    } else {
        conjunction
    })
}

fn build_in_list(
    expr: &SqlExpr,
    list: &[SqlExpr],
    negated: bool,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let target = build_expr(expr, planner)?;
    let parameters = list.iter().map(|e| build_expr(e, planner)).collect::<Result<Vec<_>>>()?;
    let op = if negated { ComparisonOperator::NotInList } else { ComparisonOperator::InList };
    Ok(Expression::new(ExprKind::ComparisonOp(op)).with_left(target).with_parameters(parameters))
}

fn build_in_subquery(
    expr: &SqlExpr,
    subquery: &Query,
    negated: bool,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let target = build_expr(expr, planner)?;
    let plan = planner.plan_subquery(subquery)?;
    let sub = Expression::new(ExprKind::Subquery(Box::new(plan)));
    let op = if negated { ComparisonOperator::NotInSubQuery } else { ComparisonOperator::InSubQuery };
    Ok(Expression::new(ExprKind::ComparisonOp(op)).with_left(target).with_right(sub))
}

/// `CASE` is lowered to a `CASE` function call taking a flattened
/// `[when1, then1, when2, then2, ..., else?]` (or, for the simple form,
/// `[operand, when1, then1, ..., else?]`) parameter list. There is no
/// dedicated tree shape for conditionals; this keeps the expression
/// vocabulary closed.
fn build_case(
    operand: &Option<Box<SqlExpr>>,
    conditions: &[SqlExpr],
    results: &[SqlExpr],
    else_result: &Option<Box<SqlExpr>>,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let mut parameters = Vec::new();
    if let Some(operand) = operand {
        parameters.push(build_expr(operand, planner)?);
    }
    for (cond, res) in conditions.iter().zip(results.iter()) {
        parameters.push(build_expr(cond, planner)?);
        parameters.push(build_expr(res, planner)?);
    }
    if let Some(else_result) = else_result {
        parameters.push(build_expr(else_result, planner)?);
    }
    Ok(Expression::function("CASE", parameters))
}

fn build_function_call(
    func: &sqlparser::ast::Function,
    planner: &mut dyn SubqueryPlanner,
) -> Result<Expression> {
    let name = object_name_to_string(&func.name).to_uppercase();
    let mut args = Vec::new();
    for arg in &func.args {
        match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => args.push(build_expr(e, planner)?),
            FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => args.push(Expression::wildcard(None)),
            FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => args.push(build_expr(e, planner)?),
            _ => {}
        }
    }
    Ok(Expression::function(name, args))
}

pub fn build_select_item(item: &SelectItem, planner: &mut dyn SubqueryPlanner) -> Result<Expression> {
    match item {
        SelectItem::UnnamedExpr(expr) => build_expr(expr, planner),
        SelectItem::ExprWithAlias { expr, alias } => {
            Ok(build_expr(expr, planner)?.with_alias(alias.value.clone()))
        }
        SelectItem::Wildcard(_) => Ok(Expression::wildcard(None)),
        SelectItem::QualifiedWildcard(name, _) => Ok(Expression::wildcard(Some(object_name_to_string(name)))),
    }
}

/// Builds `(expression, descending, nulls_first)`.
pub fn build_order_by(item: &OrderByExpr, planner: &mut dyn SubqueryPlanner) -> Result<(Expression, bool, bool)> {
    let expr = build_expr(&item.expr, planner)?;
    let desc = matches!(item.asc, Some(false));
    let nulls_first = item.nulls_first.unwrap_or(desc);
    Ok((expr, desc, nulls_first))
}

fn map_sql_value(value: &SqlValue) -> Result<OxValue> {
    Ok(match value {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                OxValue::Integer(i)
            } else if let Ok(d) = Decimal::from_str(n) {
                OxValue::Decimal(d)
            } else {
                OxValue::Double(n.parse::<f64>().map_err(|_| {
                    OpteryxError::sql(format!("malformed numeric literal: {n}"))
                })?)
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => OxValue::Varchar(s.clone()),
        SqlValue::NationalStringLiteral(s) | SqlValue::EscapedStringLiteral(s) => OxValue::Varchar(s.clone()),
        SqlValue::HexStringLiteral(s) => OxValue::Blob(s.as_bytes().to_vec()),
        SqlValue::Boolean(b) => OxValue::Boolean(*b),
        SqlValue::Null => OxValue::Null,
        SqlValue::Placeholder(p) => {
            return Err(OpteryxError::parameter(format!(
                "unbound placeholder reached expression construction: {p}"
            )))
        }
        other => return Err(OpteryxError::unsupported(format!("literal not supported: {other}"))),
    })
}

/// Maps a parsed `CAST`/`TRY_CAST` target type onto the closed [`DataType`]
/// vocabulary this pipeline understands. Anything outside that vocabulary
/// (including the bare `STRUCT` keyword, which this data model only ever
/// produces internally, never as a `CAST` target) is a genuine unsupported
/// target, not a silent default.
fn map_sql_datatype(data_type: &SqlDataType) -> Result<DataType> {
    Ok(match data_type {
        SqlDataType::Boolean => DataType::Boolean,
        SqlDataType::TinyInt(_)
        | SqlDataType::SmallInt(_)
        | SqlDataType::Int(_)
        | SqlDataType::Integer(_)
        | SqlDataType::BigInt(_) => DataType::Integer,
        SqlDataType::Float(_) | SqlDataType::Double | SqlDataType::Real => DataType::Double,
        SqlDataType::Decimal(info) | SqlDataType::Numeric(info) => {
            let (precision, scale) = match info {
                sqlparser::ast::ExactNumberInfo::None => (38, 0),
                sqlparser::ast::ExactNumberInfo::Precision(p) => (*p as u8, 0),
                sqlparser::ast::ExactNumberInfo::PrecisionAndScale(p, s) => (*p as u8, *s as i8),
            };
            DataType::Decimal { precision, scale }
        }
        SqlDataType::Varchar(_) | SqlDataType::Text | SqlDataType::Char(_) | SqlDataType::String(_) => {
            DataType::Varchar
        }
        SqlDataType::Blob(_) | SqlDataType::Bytea => DataType::Blob,
        SqlDataType::Date => DataType::Date,
        SqlDataType::Time(_, _) => DataType::Time,
        SqlDataType::Timestamp(_, _) => DataType::Timestamp,
        SqlDataType::Interval => DataType::Interval,
        SqlDataType::Array(inner) => match inner {
            Some(t) => DataType::Array(Box::new(map_sql_datatype(t)?)),
            None => DataType::Array(Box::new(DataType::Missing)),
        },
        other => {
            return Err(OpteryxError::unsupported(format!("CAST target type not supported: {other}")))
        }
    })
}
