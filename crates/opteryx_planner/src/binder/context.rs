//! Per-node binding scope: the set of relations (plus the synthetic
//! `$derived` schema) visible while an expression is being bound.

use std::collections::HashMap;

use opteryx_error::{OpteryxError, Result};
use opteryx_types::{ColumnDef, ColumnId, RelationSchema};

pub const DERIVED_SCHEMA_NAME: &str = "$derived";
/// Where a `Project` node's `$derived`-origin columns land once binding is
/// done and the scope is narrowed to just the projection list.
pub const PROJECT_SCHEMA_NAME: &str = "$project";

/// The name resolution scope at one point in the plan. Every [`PlanNode`]
/// visit produces one of these, either freshly (a `Scan`) or merged from its
/// children (a `Join`) or inherited unchanged (`Distinct`, `Order`, `Limit`).
#[derive(Debug, Clone, Default)]
pub struct BindingContext {
    relations: Vec<RelationSchema>,
    derived: RelationSchema,
    /// The ordered column list a `Project`/`AggregateAndGroup`/`Distinct`
    /// node has explicitly selected, if any. Empty means "every relation
    /// column plus every derived column, in scope order" -- the natural
    /// shape directly downstream of a `Scan`/`Filter`/`Join`.
    output: Vec<ColumnId>,
    /// Forced display label for an id in `output`, when binding gave it one:
    /// an explicit `AS` alias, or a computed expression's synthesized name.
    /// A plain passthrough column reference carries no entry here, so `Exit`
    /// can still decide whether its bare name needs qualifying.
    output_labels: HashMap<ColumnId, String>,
}

impl BindingContext {
    pub fn empty() -> Self {
        BindingContext {
            relations: Vec::new(),
            derived: RelationSchema::new(DERIVED_SCHEMA_NAME),
            output: Vec::new(),
            output_labels: HashMap::new(),
        }
    }

    pub fn single(schema: RelationSchema) -> Self {
        let mut ctx = Self::empty();
        ctx.relations.push(schema);
        ctx
    }

    /// Explicitly set the ordered output column list and, for entries that
    /// picked one up while binding, the forced display label each should
    /// carry downstream (a `Project`, `AggregateAndGroup` or `Distinct` node
    /// narrowing what's visible).
    pub fn set_output(&mut self, items: Vec<(ColumnId, Option<String>)>) {
        self.output = items.iter().map(|(id, _)| *id).collect();
        self.output_labels = items.into_iter().filter_map(|(id, label)| label.map(|l| (id, l))).collect();
    }

    /// The label recorded for `id` by the most recent `set_output`, if any.
    pub fn output_label(&self, id: ColumnId) -> Option<&str> {
        self.output_labels.get(&id).map(|s| s.as_str())
    }

    /// After a `Project` node binds its column list: prune every relation
    /// schema down to just the columns still referenced by `keep`, drop
    /// relations left with nothing visible, move whatever is left in
    /// `$derived` into a fresh `$project` schema, and reset `$derived` to
    /// empty.
    pub fn finish_project(&mut self, keep: &[ColumnId]) {
        for relation in &mut self.relations {
            relation.columns.retain(|c| keep.contains(&c.identity));
        }
        self.relations.retain(|r| !r.columns.is_empty());

        if !self.derived.columns.is_empty() {
            let moved = std::mem::take(&mut self.derived.columns);
            self.relations.push(RelationSchema::with_columns(PROJECT_SCHEMA_NAME.to_string(), moved));
        }
        self.derived = RelationSchema::new(DERIVED_SCHEMA_NAME);
    }

    /// The column ids an `Exit`/`Order` node should treat as "the result",
    /// falling back to every relation and derived column in scope order
    /// when nothing has narrowed it yet (directly downstream of a `Scan`,
    /// `Filter` or `Join`).
    pub fn output_or_all(&self) -> Vec<ColumnId> {
        if !self.output.is_empty() {
            return self.output.clone();
        }
        self.relations
            .iter()
            .flat_map(|r| r.columns.iter())
            .chain(self.derived.columns.iter())
            .map(|c| c.identity)
            .collect()
    }

    pub fn relations(&self) -> &[RelationSchema] {
        &self.relations
    }

    pub fn derived(&self) -> &RelationSchema {
        &self.derived
    }

    pub fn push_derived(&mut self, column: ColumnDef) {
        self.derived.push_column(column);
    }

    /// Union two sibling scopes (the two sides of a join). Reusing the same
    /// relation alias on both sides is an error -- the binder has no way to
    /// disambiguate a future unqualified reference.
    pub fn merge(mut self, other: BindingContext) -> Result<Self> {
        for relation in other.relations {
            if self.relations.iter().any(|r| r.name.eq_ignore_ascii_case(&relation.name)) {
                return Err(OpteryxError::ambiguous_dataset(&relation.name));
            }
            self.relations.push(relation);
        }
        for column in other.derived.columns {
            self.derived.push_column(column);
        }
        Ok(self)
    }

    /// All column display names currently visible, used to build fuzzy
    /// suggestions for a `ColumnNotFound` error.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .relations
            .iter()
            .flat_map(|r| r.columns.iter().map(|c| c.name.clone()))
            .collect();
        names.extend(self.derived.columns.iter().map(|c| c.name.clone()));
        names
    }

    /// Resolve a possibly-qualified identifier to the column it names.
    pub fn resolve(&self, name: &str, qualifier: Option<&str>) -> Result<ColumnId> {
        if let Some(qualifier) = qualifier {
            let owning: Vec<&RelationSchema> =
                self.relations.iter().filter(|r| r.contains_source(qualifier)).collect();
            if owning.is_empty() {
                return Err(OpteryxError::unexpected_dataset_reference(qualifier));
            }
            let matches: Vec<ColumnId> =
                owning.iter().filter_map(|r| r.find_column(name)).map(|c| c.identity).collect();
            return match matches.len() {
                0 => Err(OpteryxError::column_not_found(
                    &format!("{qualifier}.{name}"),
                    self.suggest(name),
                )),
                1 => Ok(matches[0]),
                _ => Err(OpteryxError::ambiguous_identifier(name)),
            };
        }

        let mut matches: Vec<ColumnId> =
            self.relations.iter().filter_map(|r| r.find_column(name)).map(|c| c.identity).collect();
        matches.extend(self.derived.find_column(name).map(|c| c.identity));
        matches.dedup();

        match matches.len() {
            0 => Err(OpteryxError::column_not_found(name, self.suggest(name))),
            1 => Ok(matches[0]),
            _ => Err(OpteryxError::ambiguous_identifier(name)),
        }
    }

    /// Fold a `USING(col)` pair into one column shared by every relation
    /// that carries it, so a later unqualified reference resolves to a
    /// single id rather than tripping the ambiguity check.
    pub fn merge_using_column(&mut self, name: &str) -> Result<()> {
        let owners: Vec<usize> = self
            .relations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.find_column(name).is_some())
            .map(|(i, _)| i)
            .collect();
        if owners.len() < 2 {
            return Err(OpteryxError::column_not_found(name, self.suggest(name)));
        }

        let first = owners[0];
        let mut origins = self.relations[first]
            .find_column(name)
            .expect("checked above")
            .origin
            .clone();
        if origins.is_empty() {
            origins.push(self.relations[first].name.clone());
        }

        for &idx in &owners[1..] {
            if let Some(col) = self.relations[idx].find_column(name) {
                for o in &col.origin {
                    if !origins.contains(o) {
                        origins.push(o.clone());
                    }
                }
            }
            if !origins.contains(&self.relations[idx].name) {
                origins.push(self.relations[idx].name.clone());
            }
            self.relations[idx].columns.retain(|c| !c.matches_name(name));
        }

        if let Some(col) = self.relations[first].find_column_mut(name) {
            col.origin = origins;
        }
        Ok(())
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnDef> {
        self.relations
            .iter()
            .flat_map(|r| r.columns.iter())
            .chain(self.derived.columns.iter())
            .find(|c| c.identity == id)
    }

    /// The name of the relation `id` belongs to, for qualifying a bare
    /// column reference (`a.name`) when its own `origin` list is empty --
    /// true for every ordinary scanned column, which only gains an `origin`
    /// entry once it survives a `USING` merge.
    pub fn relation_name_for(&self, id: ColumnId) -> Option<&str> {
        self.relations
            .iter()
            .find(|r| r.columns.iter().any(|c| c.identity == id))
            .map(|r| r.name.as_str())
    }

    /// Every column visible in this scope, relation-qualified columns first
    /// then `$derived`. Used to expand `*`/`relation.*`.
    pub fn visible_columns(&self, qualifier: Option<&str>) -> Vec<&ColumnDef> {
        match qualifier {
            Some(q) => self
                .relations
                .iter()
                .filter(|r| r.contains_source(q))
                .flat_map(|r| r.columns.iter())
                .collect(),
            None => self
                .relations
                .iter()
                .flat_map(|r| r.columns.iter())
                .chain(self.derived.columns.iter())
                .collect(),
        }
    }

    fn suggest(&self, name: &str) -> Option<String> {
        crate::functions::suggest_name(name, &self.all_names())
    }
}
