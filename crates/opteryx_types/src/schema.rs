use std::fmt;

use crate::datatype::DataType;
use crate::value::Value;

/// Stable identity for a column within one query compilation.
///
/// The original system hashes name/origin tuples; per the redesign notes we
/// use a monotonically-assigned handle instead, minted by
/// [`ColumnIdAllocator`]. Handles are unique within a single bind, never
/// reused, and comparable with simple integer equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub u64);

#[derive(Debug, Default)]
pub struct ColumnIdAllocator {
    next: u64,
}

impl ColumnIdAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next(&mut self) -> ColumnId {
        let id = ColumnId(self.next);
        self.next += 1;
        id
    }
}

/// Per-column statistics used for blob pruning, lifted from a connector's
/// [`Statistics`](opteryx statistics capability) response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColumnStatistics {
    pub lower_bound: Option<i64>,
    pub upper_bound: Option<i64>,
    pub null_count: Option<i64>,
    pub cardinality_estimate: Option<i64>,
}

/// What backs a column's value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Backed directly by a physical column read from a connector.
    Flat,
    /// A single known value, synthesized during binding (e.g. a literal).
    Constant(Value),
    /// Computed by a bound scalar/aggregate function call.
    Function,
    /// Computed by an arbitrary expression tree.
    Expression,
}

/// A single column in a [`RelationSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub identity: ColumnId,
    pub name: String,
    pub aliases: Vec<String>,
    pub data_type: DataType,
    pub nullable: bool,
    /// Names of the relations this column is visible under. A column
    /// surviving a `USING` join belongs to both its originating relations at
    /// once.
    pub origin: Vec<String>,
    pub kind: ColumnKind,
    pub statistics: Option<ColumnStatistics>,
}

impl ColumnDef {
    pub fn new(identity: ColumnId, name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        ColumnDef {
            identity,
            origin: vec![],
            aliases: vec![],
            nullable: true,
            kind: ColumnKind::Flat,
            statistics: None,
            name,
            data_type,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin.push(origin.into());
        self
    }

    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn belongs_to(&self, relation: &str) -> bool {
        self.origin.iter().any(|o| o.eq_ignore_ascii_case(relation))
    }
}

impl fmt::Display for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.data_type)
    }
}

/// A named set of columns visible within a binding scope.
///
/// Multiple `RelationSchema`s are visible at once while binding a single plan
/// node (one per relation in scope, plus the distinguished `$derived`
/// schema); see `opteryx_planner::binder::BindingContext`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl RelationSchema {
    pub fn new(name: impl Into<String>) -> Self {
        RelationSchema {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_columns(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        RelationSchema {
            name: name.into(),
            columns,
        }
    }

    pub fn push_column(&mut self, column: ColumnDef) {
        self.columns.push(column);
    }

    /// Whether this schema's compound name (e.g. a `$shared-<id>` schema
    /// encoding `^left#^right#`) contains the given relation name.
    pub fn contains_source(&self, source: &str) -> bool {
        self.name.eq_ignore_ascii_case(source)
            || self.name.contains(&format!("^{source}#"))
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.matches_name(name))
    }

    pub fn find_column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.matches_name(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_column_by_alias() {
        let mut schema = RelationSchema::new("planets");
        let mut allocator = ColumnIdAllocator::new();
        let mut col = ColumnDef::new(allocator.next(), "name", DataType::Varchar);
        col.aliases.push("planet_name".to_string());
        schema.push_column(col);

        assert!(schema.find_column("name").is_some());
        assert!(schema.find_column("planet_name").is_some());
        assert!(schema.find_column("missing").is_none());
    }

    #[test]
    fn shared_schema_contains_both_origins() {
        let schema = RelationSchema::new("^planets#^satellites#");
        assert!(schema.contains_source("planets"));
        assert!(schema.contains_source("satellites"));
        assert!(!schema.contains_source("moons"));
    }

    #[test]
    fn column_id_allocator_is_monotonic_and_unique() {
        let mut allocator = ColumnIdAllocator::new();
        let a = allocator.next();
        let b = allocator.next();
        assert_ne!(a, b);
        assert!(a.0 < b.0);
    }
}
