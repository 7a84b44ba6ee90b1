//! Per-node binding pass: walks a [`LogicalPlan`] bottom-up (children before
//! parents, via [`LogicalPlan::post_order`]) and, at each node, binds its own
//! expressions against the [`BindingContext`] its children produced.

use std::collections::HashMap;

use ahash::RandomState;
use chrono::NaiveDate;
use opteryx_error::{OpteryxError, Result};
use opteryx_types::{ColumnDef, ColumnId, ColumnIdAllocator, ColumnKind, DataType, RelationSchema};

use crate::expr::{Expression, ExprKind};
use crate::functions::FunctionCatalogue;
use crate::graph::EdgeRole;
use crate::logical::plan::{FunctionDatasetKind, JoinType, LogicalPlan, PlanNode, SetVariant};

use tracing::debug;

use super::context::BindingContext;
use super::expr_bind::{expand_wildcards, Binder};
use super::SchemaProvider;

const NODE_ID_HASH_STATE: RandomState = RandomState::with_seeds(0, 0, 0, 0);

/// Bind every expression in `plan` in place, returning the [`BindingContext`]
/// at the plan's exit -- the shape a caller embedding this as a subquery
/// needs to know the result's column count and types.
pub fn bind_plan(
    plan: &mut LogicalPlan,
    schemas: &dyn SchemaProvider,
    functions: &FunctionCatalogue,
    today: NaiveDate,
) -> Result<BindingContext> {
    let order = plan.post_order()?;
    debug!(nodes = order.len(), "binding logical plan");
    let mut contexts: HashMap<String, BindingContext, RandomState> =
        HashMap::with_hasher(NODE_ID_HASH_STATE);
    let mut allocator = ColumnIdAllocator::new();

    for id in &order {
        let ctx = bind_node(plan, id, &contexts, schemas, functions, &mut allocator, today)?;
        contexts.insert(id.clone(), ctx);
    }

    let exit_id = plan.exit_id()?.to_string();
    contexts
        .remove(&exit_id)
        .ok_or_else(|| OpteryxError::internal("exit node produced no binding context"))
}

fn incoming(plan: &LogicalPlan, id: &str) -> Vec<(String, EdgeRole)> {
    plan.graph
        .ingoing_edges(id)
        .into_iter()
        .map(|(source, _, role)| (source.to_string(), role.clone()))
        .collect()
}

fn bind_node(
    plan: &mut LogicalPlan,
    id: &str,
    contexts: &HashMap<String, BindingContext, RandomState>,
    schemas: &dyn SchemaProvider,
    functions: &FunctionCatalogue,
    allocator: &mut ColumnIdAllocator,
    today: NaiveDate,
) -> Result<BindingContext> {
    let incoming = incoming(plan, id);

    let single_ctx = || -> Result<BindingContext> {
        match incoming.len() {
            0 => Ok(BindingContext::empty()),
            1 => contexts.get(&incoming[0].0).cloned().ok_or_else(|| {
                OpteryxError::internal(format!(
                    "node '{id}' bound before its child '{}'",
                    incoming[0].0
                ))
            }),
            n => Err(OpteryxError::internal(format!(
                "node '{id}' expected exactly one incoming edge, found {n}"
            ))),
        }
    };

    let role_ctx = |role: &str| -> Result<BindingContext> {
        incoming
            .iter()
            .find(|(_, r)| r.as_deref() == Some(role))
            .and_then(|(source, _)| contexts.get(source).cloned())
            .ok_or_else(|| OpteryxError::internal(format!("node '{id}' missing its '{role}' input")))
    };

    let node = plan
        .graph
        .node_mut(id)
        .ok_or_else(|| OpteryxError::internal(format!("dangling node id '{id}'")))?;

    match node {
        PlanNode::Scan { dataset, alias, schema, .. } => {
            let resolved = schemas.get_dataset_schema(dataset)?;
            let named = RelationSchema::with_columns(alias.clone(), resolved.columns);
            *schema = Some(named.clone());
            Ok(BindingContext::single(named))
        }

        PlanNode::Filter { condition } => {
            let mut ctx = single_ctx()?;
            Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(condition)?;
            if !condition.data_type.is_missing() && !condition.data_type.comparable_with(&DataType::Boolean) {
                return Err(OpteryxError::incompatible_types(format!(
                    "WHERE/HAVING condition must be boolean, found {}",
                    condition.data_type
                )));
            }
            Ok(ctx)
        }

        PlanNode::Project { columns, order_only_columns } => {
            let mut ctx = single_ctx()?;
            let expanded = expand_wildcards(std::mem::take(columns), &ctx)?;
            *columns = expanded;
            for item in columns.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(item)?;
                reject_unnamed_projection(item)?;
            }
            for item in order_only_columns.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(item)?;
            }
            reject_duplicate_identities(columns)?;

            let output = labelled_output(columns);
            let keep: Vec<ColumnId> = output.iter().map(|(id, _)| *id).collect();
            ctx.finish_project(&keep);
            ctx.set_output(output);
            Ok(ctx)
        }

        PlanNode::Join { join_type, condition, using } => {
            let left = role_ctx("left")?;
            let right = role_ctx("right")?;
            let mut merged = left.clone().merge(right.clone())?;
            for name in using.iter() {
                merged.merge_using_column(name)?;
            }
            if let Some(cond) = condition {
                Binder { ctx: &mut merged, functions, allocator, schemas, today }.bind(cond)?;
                if !cond.data_type.is_missing() && !cond.data_type.comparable_with(&DataType::Boolean) {
                    return Err(OpteryxError::incompatible_types(format!(
                        "JOIN ... ON condition must be boolean, found {}",
                        cond.data_type
                    )));
                }
            }
            // SEMI/ANTI joins only ever retain one side's columns downstream;
            // the other side (and anything synthesized while binding the
            // condition against the combined scope) is dropped here.
            let ctx = match join_type {
                JoinType::LeftSemi | JoinType::LeftAnti => left,
                JoinType::RightSemi | JoinType::RightAnti => right,
                _ => merged,
            };
            Ok(ctx)
        }

        PlanNode::AggregateAndGroup { groups, aggregates, projection } => {
            let mut ctx = single_ctx()?;
            for group in groups.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(group)?;
            }
            for call in aggregates.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(call)?;
            }
            for item in projection.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(item)?;
                reject_unnamed_projection(item)?;
            }
            reject_duplicate_identities(projection)?;
            let output = labelled_output(projection);
            ctx.set_output(output);
            Ok(ctx)
        }

        PlanNode::Aggregate { aggregates } => {
            let mut ctx = single_ctx()?;
            for call in aggregates.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(call)?;
            }
            let output = labelled_output(aggregates);
            ctx.set_output(output);
            Ok(ctx)
        }

        PlanNode::Distinct { on } => {
            let mut ctx = single_ctx()?;
            if let Some(columns) = on {
                for column in columns.iter_mut() {
                    Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(column)?;
                }
            }
            Ok(ctx)
        }

        PlanNode::Order { columns } => {
            let mut ctx = single_ctx()?;
            for (expr, _, _) in columns.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(expr)?;
            }
            Ok(ctx)
        }

        PlanNode::Limit { .. } => single_ctx(),

        PlanNode::HeapSort { columns, .. } => {
            let mut ctx = single_ctx()?;
            for (expr, _, _) in columns.iter_mut() {
                Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(expr)?;
            }
            Ok(ctx)
        }

        PlanNode::Union { .. } => {
            let left = role_ctx("left")?;
            let right = role_ctx("right")?;
            union_schemas("UNION", "$union", left, right, allocator)
        }

        PlanNode::Difference => {
            let left = role_ctx("left")?;
            let right = role_ctx("right")?;
            union_schemas("EXCEPT", "$difference", left, right, allocator)
        }

        PlanNode::Exit { columns } => {
            let ctx = single_ctx()?;
            let ids = ctx.output_or_all();

            // Columns that never picked up an explicit label (no alias, and
            // nothing synthesized one while binding) fall back to their bare
            // name, qualified only if that bare name collides with another
            // unlabelled column still visible at this point.
            let mut bare_name_counts: HashMap<&str, usize> = HashMap::new();
            for id in &ids {
                if ctx.output_label(*id).is_none() {
                    if let Some(col) = ctx.column(*id) {
                        *bare_name_counts.entry(col.name.as_str()).or_insert(0) += 1;
                    }
                }
            }

            let mut built = Vec::new();
            for id in ids {
                let col = ctx
                    .column(id)
                    .ok_or_else(|| OpteryxError::internal("exit referenced a column id not in scope"))?;
                let display_name = match ctx.output_label(id) {
                    Some(label) => label.to_string(),
                    None if bare_name_counts.get(col.name.as_str()).copied().unwrap_or(0) > 1 => {
                        match col.origin.first().map(String::as_str).or_else(|| ctx.relation_name_for(id)) {
                            Some(qualifier) => format!("{qualifier}.{}", col.name),
                            None => col.name.clone(),
                        }
                    }
                    None => col.name.clone(),
                };
                let mut expr = Expression::identifier(col.name.clone(), col.origin.first().cloned());
                expr.schema_column = Some(col.identity);
                expr.data_type = col.data_type.clone();
                expr.query_column = Some(display_name);
                built.push(expr);
            }
            *columns = built;
            Ok(ctx)
        }

        PlanNode::Cte { alias } => Ok(rename_context(single_ctx()?, alias)),

        PlanNode::Subquery { alias } => Ok(rename_context(single_ctx()?, alias)),

        PlanNode::FunctionDataset { alias, kind } => {
            let mut ctx = BindingContext::empty();
            let schema = bind_function_dataset(alias, kind, &mut ctx, functions, allocator, schemas, today)?;
            Ok(BindingContext::single(schema))
        }

        PlanNode::Explain { .. } | PlanNode::MetadataWriter { .. } => single_ctx(),

        PlanNode::Show { .. } | PlanNode::ShowColumns { .. } => Ok(BindingContext::empty()),

        PlanNode::Set { variant } => {
            let mut ctx = BindingContext::empty();
            let SetVariant::Variable { value, .. } = variant;
            Binder { ctx: &mut ctx, functions, allocator, schemas, today }.bind(value)?;
            Ok(ctx)
        }
    }
}

fn reject_unnamed_projection(item: &Expression) -> Result<()> {
    if item.alias.is_none() && matches!(item.kind, ExprKind::Function { .. } | ExprKind::Aggregator { .. }) {
        return Err(OpteryxError::unnamed_column(
            item.query_column.clone().unwrap_or_else(|| item.to_string()),
        ));
    }
    Ok(())
}

/// A repeated schema identity in a single projection list -- `SELECT a, a`,
/// or two differently-spelled references that resolve to the same column --
/// is ambiguous: a consumer asking for that identity downstream can no
/// longer tell which occurrence it meant.
fn reject_duplicate_identities(columns: &[Expression]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for item in columns {
        if let Some(id) = item.schema_column {
            if !seen.insert(id) {
                let label = item.query_column.clone().unwrap_or_else(|| item.to_string());
                return Err(OpteryxError::ambiguous_identifier(&label));
            }
        }
    }
    Ok(())
}

/// Pairs each bound projection item's schema id with the label it should
/// force downstream: an explicit `AS` alias, or (for anything that isn't a
/// plain passthrough column reference) the label binding synthesized for
/// it. A bare, unaliased `Identifier` carries no forced label, leaving
/// `Exit` free to decide whether its bare name needs qualifying.
fn labelled_output(columns: &[Expression]) -> Vec<(ColumnId, Option<String>)> {
    columns
        .iter()
        .filter_map(|c| {
            let id = c.schema_column?;
            let label = match (&c.alias, &c.kind) {
                (Some(alias), _) => Some(alias.clone()),
                (None, ExprKind::Identifier(_)) => None,
                (None, _) => c.query_column.clone(),
            };
            Some((id, label))
        })
        .collect()
}

/// Rename a child scope's visible columns under a single alias, as a `CTE`
/// or derived-table `Subquery` node does for everything downstream.
fn rename_context(ctx: BindingContext, alias: &str) -> BindingContext {
    let mut columns = Vec::new();
    for id in ctx.output_or_all() {
        if let Some(col) = ctx.column(id) {
            let mut renamed = col.clone();
            renamed.origin = vec![alias.to_string()];
            columns.push(renamed);
        }
    }
    BindingContext::single(RelationSchema::with_columns(alias.to_string(), columns))
}

fn union_schemas(
    label: &str,
    relation_name: &str,
    left: BindingContext,
    right: BindingContext,
    allocator: &mut ColumnIdAllocator,
) -> Result<BindingContext> {
    let left_ids = left.output_or_all();
    let right_ids = right.output_or_all();
    if left_ids.len() != right_ids.len() {
        return Err(OpteryxError::sql(format!(
            "{label} requires both sides to produce the same number of columns ({} vs {})",
            left_ids.len(),
            right_ids.len()
        )));
    }

    let mut columns = Vec::with_capacity(left_ids.len());
    for (l, r) in left_ids.iter().zip(right_ids.iter()) {
        let left_col = left
            .column(*l)
            .ok_or_else(|| OpteryxError::internal(format!("{label}: dangling column id on the left side")))?;
        let right_col = right
            .column(*r)
            .ok_or_else(|| OpteryxError::internal(format!("{label}: dangling column id on the right side")))?;
        if !left_col.data_type.comparable_with(&right_col.data_type) {
            return Err(OpteryxError::incompatible_types(format!(
                "{label} column '{}' has mismatched types {} and {}",
                left_col.name, left_col.data_type, right_col.data_type
            )));
        }
        columns.push(
            ColumnDef::new(allocator.next(), left_col.name.clone(), left_col.data_type.clone())
                .with_kind(ColumnKind::Expression),
        );
    }

    Ok(BindingContext::single(RelationSchema::with_columns(relation_name.to_string(), columns)))
}

fn bind_function_dataset(
    alias: &str,
    kind: &mut FunctionDatasetKind,
    ctx: &mut BindingContext,
    functions: &FunctionCatalogue,
    allocator: &mut ColumnIdAllocator,
    schemas: &dyn SchemaProvider,
    today: NaiveDate,
) -> Result<RelationSchema> {
    match kind {
        FunctionDatasetKind::Values(rows) => {
            let width = rows.first().map(|r| r.len()).unwrap_or(0);
            let mut column_types = vec![DataType::Missing; width];
            for row in rows.iter_mut() {
                if row.len() != width {
                    return Err(OpteryxError::sql("VALUES rows must all have the same arity"));
                }
                for (i, expr) in row.iter_mut().enumerate() {
                    Binder { ctx, functions, allocator, schemas, today }.bind(expr)?;
                    if column_types[i].is_missing() {
                        column_types[i] = expr.data_type.clone();
                    }
                }
            }
            let columns = column_types
                .into_iter()
                .enumerate()
                .map(|(i, data_type)| ColumnDef::new(allocator.next(), format!("column{}", i + 1), data_type))
                .collect();
            Ok(RelationSchema::with_columns(alias.to_string(), columns))
        }

        FunctionDatasetKind::Unnest(expr) => {
            Binder { ctx, functions, allocator, schemas, today }.bind(expr)?;
            let element_type = match &expr.data_type {
                DataType::Array(inner) => inner.as_ref().clone(),
                other => other.clone(),
            };
            let columns = vec![ColumnDef::new(
                allocator.next(),
                alias.trim_start_matches('$').to_string(),
                element_type,
            )];
            Ok(RelationSchema::with_columns(alias.to_string(), columns))
        }

        FunctionDatasetKind::GenerateSeries { start, stop, step } => {
            Binder { ctx, functions, allocator, schemas, today }.bind(start)?;
            Binder { ctx, functions, allocator, schemas, today }.bind(stop)?;
            if let Some(step) = step {
                Binder { ctx, functions, allocator, schemas, today }.bind(step)?;
            }
            let data_type = if start.data_type == DataType::Double || stop.data_type == DataType::Double {
                DataType::Double
            } else {
                DataType::Integer
            };
            let columns = vec![ColumnDef::new(allocator.next(), "generate_series", data_type)];
            Ok(RelationSchema::with_columns(alias.to_string(), columns))
        }

        FunctionDatasetKind::Fake { rows, seed } => {
            Binder { ctx, functions, allocator, schemas, today }.bind(rows)?;
            if let Some(seed) = seed {
                Binder { ctx, functions, allocator, schemas, today }.bind(seed)?;
            }
            Ok(RelationSchema::new(alias.to_string()))
        }
    }
}
