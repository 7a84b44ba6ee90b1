//! Recursive expression binder.
//!
//! Walks an [`Expression`] tree post-order (children before parents, via the
//! uniform `left`/`right`/`centre`/`parameters` accessors) so that by the
//! time a parent node is processed every child already carries its resolved
//! `schema_column` and `data_type`.

use chrono::NaiveDate;
use opteryx_error::{OpteryxError, Result};
use opteryx_types::{ColumnDef, ColumnId, ColumnIdAllocator, ColumnKind, DataType, Value};

use crate::expr::{ComparisonOperator, Expression, ExprKind, UnaryOperator};
use crate::functions::{FunctionCatalogue, FunctionMode};

use super::context::BindingContext;

pub struct Binder<'a> {
    pub ctx: &'a mut BindingContext,
    pub functions: &'a FunctionCatalogue,
    pub allocator: &'a mut ColumnIdAllocator,
    pub schemas: &'a dyn super::SchemaProvider,
    /// The compilation's reference date, for `Constant`-mode functions whose
    /// result depends on "now" (`NOW()`, `CURRENT_DATE`, `CURRENT_TIME`).
    pub today: NaiveDate,
}

impl<'a> Binder<'a> {
    fn synthesize(&mut self, name: impl Into<String>, data_type: DataType, kind: ColumnKind) -> ColumnId {
        let id = self.allocator.next();
        let col = ColumnDef::new(id, name, data_type.clone()).with_kind(kind);
        self.ctx.push_derived(col);
        id
    }

    pub fn bind(&mut self, expr: &mut Expression) -> Result<()> {
        if let Some(l) = &mut expr.left {
            self.bind(l)?;
        }
        if let Some(r) = &mut expr.right {
            self.bind(r)?;
        }
        if let Some(c) = &mut expr.centre {
            self.bind(c)?;
        }
        for p in &mut expr.parameters {
            self.bind(p)?;
        }

        if matches!(expr.kind, ExprKind::Subquery(_)) {
            if let ExprKind::Subquery(plan) = &mut expr.kind {
                super::bind_plan(plan, self.schemas, self.functions, self.today)?;
            }
            let data_type = if let ExprKind::Subquery(plan) = &expr.kind {
                let exit_columns = plan.graph.node(plan.exit_id()?).and_then(|n| match n {
                    crate::logical::PlanNode::Exit { columns } => Some(columns),
                    _ => None,
                });
                match exit_columns.map(|c| c.len()) {
                    Some(1) => exit_columns.unwrap()[0].data_type.clone(),
                    _ => DataType::Missing,
                }
            } else {
                unreachable!()
            };
            self.finish_derived(expr, data_type)?;
            return Ok(());
        }

        match &expr.kind {
            ExprKind::Identifier(ident) => {
                let id = self.ctx.resolve(&ident.name, ident.source.as_deref())?;
                let col = self.ctx.column(id).expect("resolve returns a live column id");
                expr.data_type = col.data_type.clone();
                expr.query_column = Some(expr.alias.clone().unwrap_or_else(|| col.name.clone()));
                expr.schema_column = Some(id);
            }
            ExprKind::Literal(value) => {
                let data_type = value.data_type();
                let id = self.synthesize(
                    expr.alias.clone().unwrap_or_else(|| value.to_string()),
                    data_type.clone(),
                    ColumnKind::Constant(value.clone()),
                );
                expr.data_type = data_type;
                expr.schema_column = Some(id);
                expr.query_column = expr.alias.clone();
            }
            ExprKind::Function { name } | ExprKind::Aggregator { name } => {
                self.bind_call(expr, name.clone())?;
            }
            ExprKind::BinaryOp(op) => {
                let (lt, rt) = self.child_types(expr)?;
                if !lt.comparable_with(&rt) {
                    return Err(OpteryxError::incompatible_types(format!(
                        "cannot apply {} to {lt} and {rt}",
                        op.as_sql()
                    )));
                }
                let result_type = arithmetic_result_type(op, &lt, &rt);
                self.finish_derived(expr, result_type)?;
            }
            ExprKind::ComparisonOp(op) => {
                if matches!(op, ComparisonOperator::InList | ComparisonOperator::NotInList) {
                    let left_type = expr.left.as_ref().map(|e| e.data_type.clone()).unwrap_or(DataType::Missing);
                    for param in &expr.parameters {
                        if !left_type.comparable_with(&param.data_type) {
                            return Err(OpteryxError::incompatible_types(format!(
                                "IN list element of type {} is not comparable with {left_type}",
                                param.data_type
                            )));
                        }
                    }
                } else if !matches!(op, ComparisonOperator::InSubQuery | ComparisonOperator::NotInSubQuery) {
                    let (lt, rt) = self.child_types(expr)?;
                    if !lt.comparable_with(&rt) {
                        return Err(OpteryxError::incompatible_types(format!(
                            "cannot compare {lt} with {rt} using {}",
                            op.as_sql()
                        )));
                    }
                }
                self.finish_derived(expr, DataType::Boolean)?;
            }
            ExprKind::UnaryOp(op) => {
                let inner = expr.left.as_ref().map(|e| e.data_type.clone()).unwrap_or(DataType::Missing);
                let result = match op {
                    UnaryOperator::Negate => inner,
                    _ => DataType::Boolean,
                };
                self.finish_derived(expr, result)?;
            }
            ExprKind::And | ExprKind::Or | ExprKind::Xor => {
                self.finish_derived(expr, DataType::Boolean)?;
            }
            ExprKind::Not => {
                self.finish_derived(expr, DataType::Boolean)?;
            }
            ExprKind::Nested => {
                let inner_type = expr.centre.as_ref().map(|e| e.data_type.clone()).unwrap_or(DataType::Missing);
                let inner_col = expr.centre.as_ref().and_then(|e| e.schema_column);
                expr.data_type = inner_type;
                expr.schema_column = inner_col;
            }
            ExprKind::Wildcard { .. } => {
                return Err(OpteryxError::internal(
                    "wildcard expression reached the binder unexpanded",
                ));
            }
            ExprKind::Subquery(_) => unreachable!("handled above"),
            ExprKind::ExpressionList => {
                self.finish_derived(expr, DataType::Missing)?;
            }
            ExprKind::Evaluated => {
                if expr.schema_column.is_none() {
                    self.finish_derived(expr, expr.data_type.clone())?;
                }
            }
        }

        Ok(())
    }

    fn child_types(&self, expr: &Expression) -> Result<(DataType, DataType)> {
        let left = expr
            .left
            .as_ref()
            .map(|e| e.data_type.clone())
            .ok_or_else(|| OpteryxError::internal("binary expression missing left operand"))?;
        let right = expr
            .right
            .as_ref()
            .map(|e| e.data_type.clone())
            .ok_or_else(|| OpteryxError::internal("binary expression missing right operand"))?;
        Ok((left, right))
    }

    fn finish_derived(&mut self, expr: &mut Expression, data_type: DataType) -> Result<()> {
        let label = expr.alias.clone().unwrap_or_else(|| expr.to_string());
        let id = self.synthesize(label.clone(), data_type.clone(), ColumnKind::Expression);
        expr.data_type = data_type;
        expr.schema_column = Some(id);
        expr.query_column = Some(expr.alias.clone().unwrap_or(label));
        Ok(())
    }

    fn bind_call(&mut self, expr: &mut Expression, name: String) -> Result<()> {
        let sig = self.functions.resolve(&name)?;
        if !sig.arity_ok(expr.parameters.len()) {
            return Err(OpteryxError::sql(format!(
                "{name} expects {}{} argument(s), got {}",
                sig.min_args,
                sig.max_args.map(|m| format!("-{m}")).unwrap_or_else(|| "+".to_string()),
                expr.parameters.len()
            )));
        }

        if sig.mode == FunctionMode::Constant {
            let value = evaluate_constant(sig.name, self.today)?;
            let data_type = value.data_type();
            let label = expr.alias.clone().unwrap_or_else(|| sig.name.to_string());
            let id = self.synthesize(label.clone(), data_type.clone(), ColumnKind::Constant(value));
            expr.kind = ExprKind::Function { name: sig.name.to_string() };
            expr.data_type = data_type;
            expr.schema_column = Some(id);
            expr.query_column = Some(expr.alias.clone().unwrap_or(label));
            return Ok(());
        }

        let is_aggregate = sig.mode == crate::functions::FunctionMode::Aggregate;
        if is_aggregate {
            expr.kind = ExprKind::Aggregator { name: sig.name.to_string() };
        } else {
            expr.kind = ExprKind::Function { name: sig.name.to_string() };
        }
        let return_type = sig.return_type.clone();
        let data_type = if return_type.is_missing() {
            expr.parameters.first().map(|p| p.data_type.clone()).unwrap_or(DataType::Missing)
        } else {
            return_type
        };
        let label = expr.alias.clone().unwrap_or_else(|| format!("{name}(...)"));
        let id = self.synthesize(label.clone(), data_type.clone(), ColumnKind::Function);
        expr.data_type = data_type;
        expr.schema_column = Some(id);
        expr.query_column = Some(expr.alias.clone().unwrap_or(label));
        Ok(())
    }
}

/// Evaluate a zero-argument `Constant`-mode builtin against the
/// compilation's reference date. `NOW`/`CURRENT_TIME` have no wall-clock
/// time available this far from the physical executor, so they report
/// midnight on `today` -- consistent with `CURRENT_DATE` and good enough
/// for planning-time constant folding.
fn evaluate_constant(name: &str, today: NaiveDate) -> Result<Value> {
    let midnight = today.and_hms_opt(0, 0, 0).expect("midnight is always a valid time");
    match name {
        "PI" => Ok(Value::Double(std::f64::consts::PI)),
        "E" => Ok(Value::Double(std::f64::consts::E)),
        "NOW" => Ok(Value::Timestamp(midnight)),
        "CURRENT_DATE" => Ok(Value::Date(today)),
        "CURRENT_TIME" => Ok(Value::Time(midnight.time())),
        "VERSION" => Ok(Value::Varchar(env!("CARGO_PKG_VERSION").to_string())),
        other => Err(OpteryxError::internal(format!(
            "no constant evaluation registered for {other}"
        ))),
    }
}

fn arithmetic_result_type(
    op: &crate::expr::BinaryOperator,
    left: &DataType,
    right: &DataType,
) -> DataType {
    use crate::expr::BinaryOperator as Op;
    if matches!(op, Op::StringConcat) {
        return DataType::Varchar;
    }
    match (left, right) {
        (DataType::Double, _) | (_, DataType::Double) => DataType::Double,
        (DataType::Decimal { .. }, _) | (_, DataType::Decimal { .. }) => left.clone(),
        _ => DataType::Integer,
    }
}

/// Replace any `Wildcard` expression in `columns` with the identifiers it
/// expands to, in schema order.
pub fn expand_wildcards(columns: Vec<Expression>, ctx: &BindingContext) -> Result<Vec<Expression>> {
    let mut out = Vec::with_capacity(columns.len());
    for column in columns {
        if let ExprKind::Wildcard { qualifier } = &column.kind {
            let cols = ctx.visible_columns(qualifier.as_deref());
            if cols.is_empty() {
                if let Some(q) = qualifier {
                    return Err(OpteryxError::unexpected_dataset_reference(q));
                }
            }
            for col in cols {
                out.push(Expression::identifier(col.name.clone(), qualifier.clone()));
            }
        } else {
            out.push(column);
        }
    }
    Ok(out)
}
