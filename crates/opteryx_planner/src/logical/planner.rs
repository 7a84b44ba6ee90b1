//! The Logical Planner: assembles a parsed statement into a [`LogicalPlan`]
//! DAG of [`PlanNode`]s, deferring all name/type resolution to the binder.

use std::collections::HashMap;

use opteryx_error::{OpteryxError, Result};
use sqlparser::ast::{
    Distinct, FunctionArg, FunctionArgExpr, GroupByExpr, Join, JoinConstraint, JoinOperator, Query,
    Select, SelectItem, SetExpr, SetOperator, SetQuantifier, Statement, TableFactor, TableWithJoins,
    Values,
};

use crate::expr::{Expression, ExprKind};
use crate::logical::builders::{build_expr, build_order_by, build_select_item, SubqueryPlanner};
use crate::logical::plan::{FunctionDatasetKind, JoinType, LogicalPlan, PlanNode, SetVariant};
use crate::rewrite::TemporalRange;

use crate::functions::AGGREGATE_NAMES as KNOWN_AGGREGATES;

use tracing::trace;

pub struct LogicalPlanner {
    plan: LogicalPlan,
    temporal: HashMap<String, TemporalRange>,
    ctes: HashMap<String, String>,
}

/// Compile a parsed statement into a logical plan, consulting `temporal` for
/// any `FOR` ranges the AST rewriter resolved onto relation aliases.
pub fn plan_statement(statement: &Statement, temporal: HashMap<String, TemporalRange>) -> Result<LogicalPlan> {
    trace!("building logical plan");
    let mut planner = LogicalPlanner {
        plan: LogicalPlan::new(),
        temporal,
        ctes: HashMap::new(),
    };
    let top = planner.plan_top_level(statement)?;
    planner.finish(top)
}

impl SubqueryPlanner for LogicalPlanner {
    fn plan_subquery(&mut self, query: &Query) -> Result<LogicalPlan> {
        let mut nested = LogicalPlanner {
            plan: LogicalPlan::new(),
            temporal: self.temporal.clone(),
            ctes: HashMap::new(),
        };
        let top = nested.plan_query(query)?;
        nested.finish(top)
    }
}

impl LogicalPlanner {
    fn finish(mut self, top: String) -> Result<LogicalPlan> {
        let exit = self.plan.add_node("exit", PlanNode::Exit { columns: Vec::new() });
        self.plan.graph.add_edge(top, exit, None);
        if !self.plan.graph.is_acyclic() {
            return Err(OpteryxError::internal("logical plan contains a cycle"));
        }
        self.plan.exit_id()?;
        Ok(self.plan)
    }

    fn plan_top_level(&mut self, statement: &Statement) -> Result<String> {
        match statement {
            Statement::Query(query) => self.plan_query(query),
            Statement::Explain {
                analyze, statement, ..
            } => {
                let inner = self.plan_top_level(statement)?;
                let id = self.plan.add_node("explain", PlanNode::Explain { analyze: *analyze });
                self.plan.graph.add_edge(inner, id.clone(), None);
                Ok(id)
            }
            Statement::ShowVariable { variable } => {
                let target = variable.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join(".");
                Ok(self.plan.add_node("show", PlanNode::Show { target }))
            }
            Statement::ShowVariables { .. } => {
                Ok(self.plan.add_node("show", PlanNode::Show { target: "ALL".to_string() }))
            }
            Statement::ShowColumns {
                extended,
                full,
                table_name,
                ..
            } => Ok(self.plan.add_node(
                "show_columns",
                PlanNode::ShowColumns {
                    relation: table_name.to_string(),
                    full: *full,
                    extended: *extended,
                },
            )),
            Statement::SetVariable { variable, value, .. } => {
                let name = variable.to_string();
                let value_expr = value
                    .first()
                    .map(|e| build_expr(e, self))
                    .transpose()?
                    .unwrap_or_else(|| Expression::literal(opteryx_types::Value::Null));
                Ok(self.plan.add_node(
                    "set",
                    PlanNode::Set {
                        variant: SetVariant::Variable { name, value: value_expr },
                    },
                ))
            }
            other => Err(OpteryxError::unsupported(format!(
                "statement kind not supported by the planner: {other}"
            ))),
        }
    }

    fn plan_query(&mut self, query: &Query) -> Result<String> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let sub_top = self.plan_query(&cte.query)?;
                let alias = cte.alias.name.value.clone();
                let id = self.plan.add_node("cte", PlanNode::Cte { alias: alias.clone() });
                self.plan.graph.add_edge(sub_top, id.clone(), None);
                self.ctes.insert(alias, id);
            }
        }

        let mut top = self.plan_set_expr(&query.body)?;

        if !query.order_by.is_empty() {
            let columns = query
                .order_by
                .iter()
                .map(|o| build_order_by(o, self))
                .collect::<Result<Vec<_>>>()?;
            let id = self.plan.add_node("order", PlanNode::Order { columns });
            self.plan.graph.add_edge(top, id.clone(), None);
            top = id;
        }

        if query.offset.is_some() || query.limit.is_some() {
            let limit = query
                .limit
                .as_ref()
                .map(|e| literal_u64(e))
                .transpose()?;
            let offset = query
                .offset
                .as_ref()
                .map(|o| literal_u64(&o.value))
                .transpose()?;
            let id = self.plan.add_node("limit", PlanNode::Limit { limit, offset });
            self.plan.graph.add_edge(top, id.clone(), None);
            top = id;
        }

        Ok(top)
    }

    fn plan_set_expr(&mut self, set_expr: &SetExpr) -> Result<String> {
        match set_expr {
            SetExpr::Select(select) => self.plan_select(select),
            SetExpr::Query(query) => self.plan_query(query),
            SetExpr::Values(values) => self.plan_values(values),
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let left_id = self.plan_set_expr(left)?;
                let right_id = self.plan_set_expr(right)?;
                let distinct = !matches!(set_quantifier, SetQuantifier::All | SetQuantifier::AllByName);
                let (prefix, node) = match op {
                    SetOperator::Union => ("union", PlanNode::Union { distinct }),
                    SetOperator::Except => ("difference", PlanNode::Difference),
                    SetOperator::Intersect => {
                        return Err(OpteryxError::unsupported("INTERSECT is not supported"))
                    }
                };
                let id = self.plan.add_node(prefix, node);
                self.plan.graph.add_edge(left_id, id.clone(), Some("left".to_string()));
                self.plan.graph.add_edge(right_id, id.clone(), Some("right".to_string()));
                Ok(id)
            }
            other => Err(OpteryxError::unsupported(format!("query body not supported: {other}"))),
        }
    }

    fn plan_values(&mut self, values: &Values) -> Result<String> {
        let mut rows = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            let exprs = row.iter().map(|e| build_expr(e, self)).collect::<Result<Vec<_>>>()?;
            rows.push(exprs);
        }
        Ok(self.plan.add_node(
            "values",
            PlanNode::FunctionDataset {
                alias: "$values".to_string(),
                kind: FunctionDatasetKind::Values(rows),
            },
        ))
    }

    fn plan_select(&mut self, select: &Select) -> Result<String> {
        let mut top = self.plan_from(&select.from)?;

        if let Some(selection) = &select.selection {
            let condition = build_expr(selection, self)?;
            let id = self.plan.add_node("filter", PlanNode::Filter { condition });
            self.plan.graph.add_edge(top, id.clone(), None);
            top = id;
        }

        let group_exprs: Vec<_> = match &select.group_by {
            GroupByExpr::All => Vec::new(),
            GroupByExpr::Expressions(exprs) => exprs.clone(),
        };

        let has_aggregate = !group_exprs.is_empty()
            || select.projection.iter().any(select_item_has_aggregate)
            || select.having.as_ref().is_some_and(expr_has_aggregate);

        if has_aggregate {
            let groups = group_exprs.iter().map(|e| build_expr(e, self)).collect::<Result<Vec<_>>>()?;
            let aggregates = collect_aggregate_calls(&select.projection, select.having.as_ref(), self)?;
            let projection = select
                .projection
                .iter()
                .map(|item| build_select_item(item, self))
                .collect::<Result<Vec<_>>>()?;
            let id = self.plan.add_node(
                "aggregate_and_group",
                PlanNode::AggregateAndGroup { groups, aggregates, projection },
            );
            self.plan.graph.add_edge(top, id.clone(), None);
            top = id;

            if let Some(having) = &select.having {
                let condition = build_expr(having, self)?;
                let id = self.plan.add_node("having", PlanNode::Filter { condition });
                self.plan.graph.add_edge(top, id.clone(), None);
                top = id;
            }
        } else {
            let columns = select
                .projection
                .iter()
                .map(|item| build_select_item(item, self))
                .collect::<Result<Vec<_>>>()?;
            let id = self.plan.add_node(
                "project",
                PlanNode::Project { columns, order_only_columns: Vec::new() },
            );
            self.plan.graph.add_edge(top, id.clone(), None);
            top = id;
        }

        match &select.distinct {
            Some(Distinct::Distinct) => {
                let id = self.plan.add_node("distinct", PlanNode::Distinct { on: None });
                self.plan.graph.add_edge(top, id.clone(), None);
                top = id;
            }
            Some(Distinct::On(exprs)) => {
                let on = exprs.iter().map(|e| build_expr(e, self)).collect::<Result<Vec<_>>>()?;
                let id = self.plan.add_node("distinct", PlanNode::Distinct { on: Some(on) });
                self.plan.graph.add_edge(top, id.clone(), None);
                top = id;
            }
            None => {}
        }

        Ok(top)
    }

    fn plan_from(&mut self, from: &[TableWithJoins]) -> Result<String> {
        if from.is_empty() {
            return Ok(self.plan.add_node(
                "no_table",
                PlanNode::FunctionDataset {
                    alias: "$no_table".to_string(),
                    kind: FunctionDatasetKind::Values(vec![Vec::new()]),
                },
            ));
        }

        let mut iter = from.iter();
        let mut top = self.plan_table_with_joins(iter.next().unwrap())?;
        for twj in iter {
            let right = self.plan_table_with_joins(twj)?;
            let id = self.plan.add_node(
                "join",
                PlanNode::Join { join_type: JoinType::Cross, condition: None, using: Vec::new() },
            );
            self.plan.graph.add_edge(top, id.clone(), Some("left".to_string()));
            self.plan.graph.add_edge(right, id.clone(), Some("right".to_string()));
            top = id;
        }
        Ok(top)
    }

    fn plan_table_with_joins(&mut self, twj: &TableWithJoins) -> Result<String> {
        let mut top = self.plan_table_factor(&twj.relation)?;
        for join in &twj.joins {
            top = self.plan_join(top, join)?;
        }
        Ok(top)
    }

    fn plan_join(&mut self, left: String, join: &Join) -> Result<String> {
        let right = self.plan_table_factor(&join.relation)?;
        let (join_type, constraint) = map_join_operator(&join.join_operator)?;

        if matches!(join.relation, TableFactor::UNNEST { .. })
            && !matches!(join_type, JoinType::Cross | JoinType::Inner)
        {
            return Err(OpteryxError::unsupported(
                "UNNEST on the right side of a join is restricted to CROSS and INNER joins",
            ));
        }

        let (condition, using) = match constraint {
            Some(JoinConstraint::On(expr)) => (Some(build_expr(expr, self)?), Vec::new()),
            Some(JoinConstraint::Using(cols)) => {
                (None, cols.iter().map(|i| i.value.clone()).collect())
            }
            Some(JoinConstraint::Natural) | None => (None, Vec::new()),
        };

        let id = self.plan.add_node("join", PlanNode::Join { join_type, condition, using });
        self.plan.graph.add_edge(left, id.clone(), Some("left".to_string()));
        self.plan.graph.add_edge(right, id.clone(), Some("right".to_string()));
        Ok(id)
    }

    fn plan_table_factor(&mut self, factor: &TableFactor) -> Result<String> {
        match factor {
            TableFactor::Table { name, alias, args, .. } => {
                let dataset = name.to_string();
                let relation_alias = alias.as_ref().map(|a| a.name.value.clone()).unwrap_or_else(|| dataset.clone());

                if let Some(call_args) = args {
                    return self.plan_function_dataset_call(&dataset, call_args, relation_alias);
                }

                if let Some(cte_id) = self.ctes.get(&relation_alias).cloned() {
                    return Ok(cte_id);
                }

                let range = self.temporal.get(&relation_alias).cloned();
                Ok(self.plan.add_node(
                    "scan",
                    PlanNode::Scan {
                        dataset,
                        alias: relation_alias,
                        start_date: range.as_ref().map(|r| r.start_date),
                        end_date: range.as_ref().map(|r| r.end_date),
                        schema: None,
                        hints: Vec::new(),
                    },
                ))
            }
            TableFactor::UNNEST { alias, array_exprs, .. } => {
                let relation_alias = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .ok_or_else(OpteryxError::unnamed_subquery)?;
                let inner = if array_exprs.len() == 1 {
                    build_expr(&array_exprs[0], self)?
                } else {
                    let mut list = Expression::new(ExprKind::ExpressionList);
                    list.parameters = array_exprs
                        .iter()
                        .map(|e| build_expr(e, self))
                        .collect::<Result<Vec<_>>>()?;
                    list
                };
                Ok(self.plan.add_node(
                    "function_dataset",
                    PlanNode::FunctionDataset { alias: relation_alias, kind: FunctionDatasetKind::Unnest(inner) },
                ))
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let sub_top = self.plan_query(subquery)?;
                let alias = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .ok_or_else(OpteryxError::unnamed_subquery)?;
                let sub_exit = self.plan.add_node("subquery_exit", PlanNode::Exit { columns: Vec::new() });
                self.plan.graph.add_edge(sub_top, sub_exit.clone(), None);
                let id = self.plan.add_node("subquery", PlanNode::Subquery { alias });
                self.plan.graph.add_edge(sub_exit, id.clone(), None);
                Ok(id)
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.plan_table_with_joins(table_with_joins)
            }
            other => Err(OpteryxError::unsupported(format!("FROM clause item not supported: {other}"))),
        }
    }

    fn plan_function_dataset_call(
        &mut self,
        name: &str,
        args: &[FunctionArg],
        relation_alias: String,
    ) -> Result<String> {
        let exprs: Vec<Expression> = args
            .iter()
            .map(|a| match a {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => build_expr(e, self),
                other => Err(OpteryxError::unsupported(format!(
                    "unsupported function-dataset argument: {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let kind = match name.to_ascii_uppercase().as_str() {
            "GENERATE_SERIES" => {
                if exprs.len() < 2 || exprs.len() > 3 {
                    return Err(OpteryxError::sql("GENERATE_SERIES takes 2 or 3 arguments"));
                }
                let mut it = exprs.into_iter();
                let start = it.next().unwrap();
                let stop = it.next().unwrap();
                let step = it.next();
                FunctionDatasetKind::GenerateSeries { start, stop, step }
            }
            "FAKE" => {
                if exprs.is_empty() || exprs.len() > 2 {
                    return Err(OpteryxError::sql("FAKE takes 1 or 2 arguments"));
                }
                let mut it = exprs.into_iter();
                let rows = it.next().unwrap();
                let seed = it.next();
                FunctionDatasetKind::Fake { rows, seed }
            }
            other => return Err(OpteryxError::unsupported(format!("unsupported function dataset: {other}"))),
        };

        Ok(self.plan.add_node("function_dataset", PlanNode::FunctionDataset { alias: relation_alias, kind }))
    }
}

fn map_join_operator(op: &JoinOperator) -> Result<(JoinType, Option<&JoinConstraint>)> {
    Ok(match op {
        JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
        JoinOperator::LeftOuter(c) => (JoinType::Left, Some(c)),
        JoinOperator::RightOuter(c) => (JoinType::Right, Some(c)),
        JoinOperator::FullOuter(c) => (JoinType::Full, Some(c)),
        JoinOperator::CrossJoin => (JoinType::Cross, None),
        JoinOperator::LeftSemi(c) => (JoinType::LeftSemi, Some(c)),
        JoinOperator::RightSemi(c) => (JoinType::RightSemi, Some(c)),
        JoinOperator::LeftAnti(c) => (JoinType::LeftAnti, Some(c)),
        JoinOperator::RightAnti(c) => (JoinType::RightAnti, Some(c)),
        other => return Err(OpteryxError::unsupported(format!("join kind not supported: {other:?}"))),
    })
}

fn literal_u64(expr: &sqlparser::ast::Expr) -> Result<u64> {
    match expr {
        sqlparser::ast::Expr::Value(sqlparser::ast::Value::Number(n, _)) => n
            .parse::<u64>()
            .map_err(|_| OpteryxError::sql(format!("expected a non-negative integer, got '{n}'"))),
        other => Err(OpteryxError::unsupported(format!(
            "LIMIT/OFFSET must be a literal integer, got {other}"
        ))),
    }
}

fn select_item_has_aggregate(item: &SelectItem) -> bool {
    match item {
        SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => expr_has_aggregate(e),
        _ => false,
    }
}

fn expr_has_aggregate(expr: &sqlparser::ast::Expr) -> bool {
    use sqlparser::ast::Expr;
    match expr {
        Expr::Function(f) => {
            let name = f.name.to_string().to_uppercase();
            KNOWN_AGGREGATES.contains(&name.as_str()) || f.args.iter().any(|a| function_arg_has_aggregate(a))
        }
        Expr::BinaryOp { left, right, .. } => expr_has_aggregate(left) || expr_has_aggregate(right),
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => expr_has_aggregate(expr),
        Expr::Case { operand, conditions, results, else_result } => {
            operand.as_deref().is_some_and(expr_has_aggregate)
                || conditions.iter().any(expr_has_aggregate)
                || results.iter().any(expr_has_aggregate)
                || else_result.as_deref().is_some_and(expr_has_aggregate)
        }
        _ => false,
    }
}

fn function_arg_has_aggregate(arg: &sqlparser::ast::FunctionArg) -> bool {
    use sqlparser::ast::{FunctionArg, FunctionArgExpr};
    match arg {
        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) | FunctionArg::Named { arg: FunctionArgExpr::Expr(e), .. } => {
            expr_has_aggregate(e)
        }
        _ => false,
    }
}

fn collect_aggregate_calls(
    projection: &[SelectItem],
    having: Option<&sqlparser::ast::Expr>,
    planner: &mut LogicalPlanner,
) -> Result<Vec<Expression>> {
    let mut calls = Vec::new();
    for item in projection {
        let expr = match item {
            SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => Some(e),
            _ => None,
        };
        if let Some(e) = expr {
            collect_aggregate_exprs(e, planner, &mut calls)?;
        }
    }
    if let Some(h) = having {
        collect_aggregate_exprs(h, planner, &mut calls)?;
    }
    Ok(calls)
}

fn collect_aggregate_exprs(
    expr: &sqlparser::ast::Expr,
    planner: &mut LogicalPlanner,
    out: &mut Vec<Expression>,
) -> Result<()> {
    use sqlparser::ast::Expr;
    if let Expr::Function(f) = expr {
        let name = f.name.to_string().to_uppercase();
        if KNOWN_AGGREGATES.contains(&name.as_str()) {
            let built = build_expr(expr, planner)?;
            let promoted = Expression {
                kind: ExprKind::Aggregator { name },
                ..built
            };
            out.push(promoted);
            return Ok(());
        }
    }
    match expr {
        Expr::BinaryOp { left, right, .. } => {
            collect_aggregate_exprs(left, planner, out)?;
            collect_aggregate_exprs(right, planner, out)?;
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            collect_aggregate_exprs(expr, planner, out)?;
        }
        _ => {}
    }
    Ok(())
}
