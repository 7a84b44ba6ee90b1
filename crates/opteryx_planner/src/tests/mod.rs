//! End-to-end seed scenarios: SQL text through rewriting, planning, and
//! binding against a fixed `$planets`/`$satellites` fixture.

use chrono::NaiveDate;
use opteryx_error::{ErrorKind, Result};
use opteryx_types::{ColumnDef, ColumnIdAllocator, DataType, RelationSchema, Value};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::binder::{bind_plan, BindingContext, SchemaProvider};
use crate::functions::FunctionCatalogue;
use crate::logical::{plan_statement, LogicalPlan, PlanNode};
use crate::rewrite::ast_rewriter::{
    bind_parameters, fix_json_accessor_precedence, resolve_temporal_bindings, ParameterSet,
};
use crate::rewrite::sql_rewriter;

struct FixturesProvider;

impl SchemaProvider for FixturesProvider {
    fn get_dataset_schema(&self, name: &str) -> Result<RelationSchema> {
        let mut alloc = ColumnIdAllocator::new();
        let schema = match name {
            "$planets" => RelationSchema::with_columns(
                name,
                vec![
                    ColumnDef::new(alloc.next(), "id", DataType::Integer),
                    ColumnDef::new(alloc.next(), "name", DataType::Varchar),
                    ColumnDef::new(alloc.next(), "density", DataType::Double),
                    ColumnDef::new(alloc.next(), "orbitalInclination", DataType::Double),
                    ColumnDef::new(alloc.next(), "escapeVelocity", DataType::Double),
                ],
            ),
            "$satellites" => RelationSchema::with_columns(
                name,
                vec![
                    ColumnDef::new(alloc.next(), "id", DataType::Integer),
                    ColumnDef::new(alloc.next(), "planetId", DataType::Integer),
                    ColumnDef::new(alloc.next(), "name", DataType::Varchar),
                ],
            ),
            other => return Err(opteryx_error::OpteryxError::dataset_not_found(other)),
        };
        Ok(schema)
    }
}

fn compile(sql: &str, params: ParameterSet) -> Result<(LogicalPlan, BindingContext)> {
    let today = NaiveDate::from_ymd_opt(2026, 7, 26).expect("valid date");
    let (cleaned, ranges) = sql_rewriter::rewrite(sql, today)?;
    let mut statement = Parser::parse_sql(&GenericDialect {}, &cleaned)
        .map_err(|e| opteryx_error::OpteryxError::sql(e.to_string()))?
        .remove(0);

    let temporal = resolve_temporal_bindings(&statement, ranges)?;
    bind_parameters(&mut statement, &params)?;
    fix_json_accessor_precedence(&mut statement);

    let mut plan = plan_statement(&statement, temporal)?;
    let schemas = FixturesProvider;
    let functions = FunctionCatalogue::with_builtins();
    let ctx = bind_plan(&mut plan, &schemas, &functions, today)?;
    Ok((plan, ctx))
}

fn exit_columns(plan: &LogicalPlan) -> Vec<crate::expr::Expression> {
    let exit_id = plan.exit_id().expect("plan has an exit");
    match plan.graph.node(exit_id).expect("exit node exists") {
        PlanNode::Exit { columns } => columns.clone(),
        other => panic!("expected Exit node, got {}", other.label()),
    }
}

fn has_node(plan: &LogicalPlan, label: &str) -> bool {
    plan.graph.node_ids().any(|id| plan.graph.node(id).map(|n| n.label() == label).unwrap_or(false))
}

#[test]
fn scenario_select_star_has_one_scan_and_every_column() {
    let (plan, _ctx) = compile("SELECT * FROM $planets", ParameterSet::None).unwrap();
    assert!(plan.graph.is_acyclic());
    assert_eq!(plan.graph.get_exit_points().len(), 1);
    assert!(has_node(&plan, "Scan"));
    assert!(!has_node(&plan, "Filter"));
    assert!(!has_node(&plan, "Join"));
    assert_eq!(exit_columns(&plan).len(), 5);
}

#[test]
fn scenario_aggregate_with_group_by_projects_one_column() {
    let (plan, _ctx) = compile(
        "SELECT MAX(density) FROM $planets GROUP BY orbitalInclination, escapeVelocity, density",
        ParameterSet::None,
    )
    .unwrap();
    assert!(has_node(&plan, "AggregateAndGroup"));
    assert_eq!(exit_columns(&plan).len(), 1);
}

#[test]
fn scenario_unnest_join_binds_without_error() {
    let (plan, _ctx) = compile(
        "SELECT name FROM $planets INNER JOIN UNNEST(('Earth', 'Mars')) AS n ON name = n",
        ParameterSet::None,
    )
    .unwrap();
    assert!(has_node(&plan, "FunctionDataset"));
    assert!(has_node(&plan, "Join"));
}

#[test]
fn scenario_for_clause_binds_temporal_range_onto_scan() {
    let (plan, _ctx) = compile("SELECT * FROM $planets FOR '1900-01-01'", ParameterSet::None).unwrap();
    let scan_id = plan
        .graph
        .node_ids()
        .find(|id| matches!(plan.graph.node(id), Some(PlanNode::Scan { .. })))
        .expect("a scan node exists")
        .to_string();
    match plan.graph.node(&scan_id).unwrap() {
        PlanNode::Scan { start_date, end_date, .. } => {
            let expected = NaiveDate::from_ymd_opt(1900, 1, 1);
            assert_eq!(*start_date, expected);
            assert_eq!(*end_date, expected);
        }
        _ => unreachable!(),
    }
}

#[test]
fn scenario_positional_parameter_binds_into_filter() {
    let (plan, _ctx) = compile(
        "SELECT * FROM $satellites WHERE planetId = ?",
        ParameterSet::Positional(vec![Value::Integer(3)]),
    )
    .unwrap();
    assert!(has_node(&plan, "Filter"));
}

#[test]
fn scenario_self_join_disambiguates_exit_columns() {
    let (plan, _ctx) = compile(
        "SELECT a.name, b.name FROM $planets AS a INNER JOIN $planets AS b ON a.id = b.id",
        ParameterSet::None,
    )
    .unwrap();
    let columns = exit_columns(&plan);
    assert_eq!(columns.len(), 2);
    let names: Vec<String> = columns.iter().filter_map(|c| c.query_column.clone()).collect();
    assert_eq!(names, vec!["a.name".to_string(), "b.name".to_string()]);
}

#[test]
fn every_exit_column_is_schema_bound() {
    let (plan, _ctx) = compile("SELECT * FROM $planets", ParameterSet::None).unwrap();
    for column in exit_columns(&plan) {
        assert!(column.schema_column.is_some());
        assert!(!column.data_type.is_missing());
    }
}

#[test]
fn unqualified_dataset_reference_against_the_wrong_relation_is_rejected() {
    let err = compile("SELECT $planets.id FROM $satellites", ParameterSet::None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnexpectedDatasetReference);
}

#[test]
fn ambiguous_column_across_a_self_join_is_rejected() {
    let err = compile(
        "SELECT id FROM $planets a JOIN $planets b ON a.id = b.id",
        ParameterSet::None,
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AmbiguousIdentifier);
}

#[test]
fn unknown_column_is_rejected_with_a_suggestion() {
    let err = compile("SELECT nonexistent FROM $planets", ParameterSet::None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ColumnNotFound);
    assert!(err.suggestion.is_some());
}

#[test]
fn duplicate_projection_identity_is_rejected() {
    let err = compile("SELECT id, id FROM $planets", ParameterSet::None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::AmbiguousIdentifier);
}

#[test]
fn aliased_projection_column_keeps_its_alias_through_exit() {
    let (plan, _ctx) = compile("SELECT density AS d FROM $planets", ParameterSet::None).unwrap();
    let columns = exit_columns(&plan);
    similar_asserts::assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].query_column.as_deref(), Some("d"));
}

#[test]
fn unaliased_projection_column_falls_back_to_its_schema_name() {
    let (plan, _ctx) = compile("SELECT density FROM $planets", ParameterSet::None).unwrap();
    let columns = exit_columns(&plan);
    assert_eq!(columns[0].query_column.as_deref(), Some("density"));
}

#[test]
fn cast_to_an_unsupported_target_type_is_an_error() {
    let err = compile("SELECT CAST(name AS UUID) FROM $planets", ParameterSet::None).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedSyntax);
}

#[test]
fn current_date_is_evaluated_at_bind_time_to_the_compilation_reference_date() {
    let (plan, _ctx) = compile("SELECT CURRENT_DATE AS d FROM $planets", ParameterSet::None).unwrap();
    let columns = exit_columns(&plan);
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].data_type, DataType::Date);
}

#[test]
fn pi_constant_evaluates_to_a_double() {
    let (plan, _ctx) = compile("SELECT PI() AS p FROM $planets", ParameterSet::None).unwrap();
    let columns = exit_columns(&plan);
    assert_eq!(columns.len(), 1);
    assert_eq!(columns[0].data_type, DataType::Double);
}
