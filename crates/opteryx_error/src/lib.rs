//! Error taxonomy for the Opteryx compilation pipeline.
//!
//! Every stage of the pipeline (rewriter, planner, binder, pruning) returns
//! [`Result`]. Errors are not recovered anywhere in the pipeline; they
//! surface to the caller as-is. `InvalidInternalState` is the only kind that
//! indicates a bug in the compiler itself rather than a problem with the
//! input query.

use std::fmt;

use serde::{Deserialize, Serialize};

pub type Result<T, E = OpteryxError> = std::result::Result<T, E>;

/// Error taxonomy kinds, matching the categories a caller needs to
/// distinguish between (e.g. to decide whether a message is safe to show a
/// user verbatim, or whether a suggestion is attached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed SQL the parser accepted but downstream stages cannot
    /// process.
    Sql,
    /// Syntactically valid SQL whose semantics the engine does not
    /// implement.
    UnsupportedSyntax,
    /// Mismatch between placeholders and supplied parameters.
    Parameter,
    /// Identifier does not resolve to any visible column.
    ColumnNotFound,
    /// Identifier resolves to more than one column.
    AmbiguousIdentifier,
    /// Qualified identifier names a relation not in scope.
    UnexpectedDatasetReference,
    /// The same alias is introduced twice in one plan.
    AmbiguousDataset,
    /// The storage factory cannot find the named dataset.
    DatasetNotFound,
    /// Unknown function name.
    FunctionNotFound,
    /// Comparison between incompatible column types.
    IncompatibleTypes,
    /// Malformed `FOR` temporal-range extension.
    InvalidTemporalRangeFilter,
    /// An invariant violation. Indicates a bug, must never be caught.
    InvalidInternalState,
    /// Attempt to mutate a server-owned variable.
    Permissions,
    /// Anonymous subquery in `FROM`.
    UnnamedSubquery,
    /// Anonymous column produced by a function without `AS`.
    UnnamedColumn,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sql => "SqlError",
            Self::UnsupportedSyntax => "UnsupportedSyntaxError",
            Self::Parameter => "ParameterError",
            Self::ColumnNotFound => "ColumnNotFoundError",
            Self::AmbiguousIdentifier => "AmbiguousIdentifierError",
            Self::UnexpectedDatasetReference => "UnexpectedDatasetReferenceError",
            Self::AmbiguousDataset => "AmbiguousDatasetError",
            Self::DatasetNotFound => "DatasetNotFoundError",
            Self::FunctionNotFound => "FunctionNotFoundError",
            Self::IncompatibleTypes => "IncompatibleTypesError",
            Self::InvalidTemporalRangeFilter => "InvalidTemporalRangeFilterError",
            Self::InvalidInternalState => "InvalidInternalStateError",
            Self::Permissions => "PermissionsError",
            Self::UnnamedSubquery => "UnnamedSubqueryError",
            Self::UnnamedColumn => "UnnamedColumnError",
        };
        write!(f, "{s}")
    }
}

/// Carries across a wire boundary (e.g. a client-facing error payload) via
/// `serde`, the same way it's held in process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpteryxError {
    pub kind: ErrorKind,
    pub message: String,
    /// A fuzzy-matched suggestion, populated for `ColumnNotFound` and
    /// `FunctionNotFound`.
    pub suggestion: Option<String>,
}

impl OpteryxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        OpteryxError {
            kind,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn sql(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sql, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedSyntax, message)
    }

    pub fn parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parameter, message)
    }

    pub fn column_not_found(name: &str, suggestion: Option<String>) -> Self {
        let mut err = Self::new(ErrorKind::ColumnNotFound, format!("Column not found: {name}"));
        if let Some(s) = suggestion {
            err = err.with_suggestion(s);
        }
        err
    }

    pub fn ambiguous_identifier(name: &str) -> Self {
        Self::new(
            ErrorKind::AmbiguousIdentifier,
            format!("Ambiguous identifier: {name}"),
        )
    }

    pub fn unexpected_dataset_reference(relation: &str) -> Self {
        Self::new(
            ErrorKind::UnexpectedDatasetReference,
            format!("Relation '{relation}' is not visible in this scope"),
        )
    }

    pub fn ambiguous_dataset(alias: &str) -> Self {
        Self::new(
            ErrorKind::AmbiguousDataset,
            format!("Duplicate relation alias: {alias}"),
        )
    }

    pub fn dataset_not_found(name: &str) -> Self {
        Self::new(ErrorKind::DatasetNotFound, format!("Dataset not found: {name}"))
    }

    pub fn function_not_found(name: &str, suggestion: Option<String>) -> Self {
        let mut err = Self::new(
            ErrorKind::FunctionNotFound,
            format!("Function not found: {name}"),
        );
        if let Some(s) = suggestion {
            err = err.with_suggestion(s);
        }
        err
    }

    pub fn incompatible_types(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IncompatibleTypes, message)
    }

    pub fn invalid_temporal_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidTemporalRangeFilter, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInternalState, message)
    }

    pub fn permissions(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permissions, message)
    }

    pub fn unnamed_subquery() -> Self {
        Self::new(
            ErrorKind::UnnamedSubquery,
            "Subquery in FROM must have an alias",
        )
    }

    pub fn unnamed_column(expr: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UnnamedColumn,
            format!("Column expression '{expr}' needs an explicit alias"),
        )
    }
}

impl fmt::Display for OpteryxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (did you mean '{suggestion}'?)")?;
        }
        Ok(())
    }
}

impl std::error::Error for OpteryxError {}

/// Shorthand for constructing an [`ErrorKind::InvalidInternalState`] error at
/// a call site, analogous to `unimplemented!`/`todo!` but returning a
/// [`Result`] instead of panicking.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::OpteryxError::internal(format!("not implemented: {}", format!($($arg)*))))
    };
}

#[macro_export]
macro_rules! invalid_state {
    ($($arg:tt)*) => {
        $crate::OpteryxError::internal(format!($($arg)*))
    };
}
