use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of SQL types understood by the compilation pipeline.
///
/// This generally follows the shape of Arrow's type system but is
/// intentionally much smaller: the compiler only needs to know enough about a
/// type to resolve functions, check comparison compatibility, and encode
/// values for blob pruning. The physical executor (out of scope here) is free
/// to pick whatever in-memory representation it likes for each variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Pre-binding sentinel. Every expression starts out carrying this type
    /// and it must not survive past the binder.
    Missing,
    Null,
    Boolean,
    Integer,
    Double,
    Decimal { precision: u8, scale: i8 },
    Varchar,
    Blob,
    Date,
    Time,
    Timestamp,
    Interval,
    Array(Box<DataType>),
    Struct,
}

impl DataType {
    pub const fn is_missing(&self) -> bool {
        matches!(self, DataType::Missing)
    }

    pub fn category(&self) -> Option<TypeCategory> {
        match self {
            DataType::Integer | DataType::Double | DataType::Decimal { .. } => {
                Some(TypeCategory::Numeric)
            }
            DataType::Date | DataType::Time | DataType::Timestamp => Some(TypeCategory::Temporal),
            DataType::Varchar | DataType::Blob => Some(TypeCategory::LargeObject),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.category() == Some(TypeCategory::Numeric)
    }

    pub fn is_temporal(&self) -> bool {
        self.category() == Some(TypeCategory::Temporal)
    }

    /// Whether two types may be compared without an explicit cast: identical
    /// types, either side is `Null`, or both sides share a relaxed category
    /// (both numeric, both temporal, both large-object).
    pub fn comparable_with(&self, other: &DataType) -> bool {
        if self == other {
            return true;
        }
        if matches!(self, DataType::Null) || matches!(other, DataType::Null) {
            return true;
        }
        match (self.category(), other.category()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Numeric,
    Temporal,
    LargeObject,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Missing => write!(f, "_MISSING_TYPE"),
            DataType::Null => write!(f, "NULL"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
            DataType::Varchar => write!(f, "VARCHAR"),
            DataType::Blob => write!(f, "BLOB"),
            DataType::Date => write!(f, "DATE"),
            DataType::Time => write!(f, "TIME"),
            DataType::Timestamp => write!(f, "TIMESTAMP"),
            DataType::Interval => write!(f, "INTERVAL"),
            DataType::Array(inner) => write!(f, "ARRAY({inner})"),
            DataType::Struct => write!(f, "STRUCT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_category_relaxed_comparison() {
        assert!(DataType::Integer.comparable_with(&DataType::Double));
        assert!(DataType::Decimal { precision: 10, scale: 2 }.comparable_with(&DataType::Integer));
    }

    #[test]
    fn null_is_comparable_with_anything() {
        assert!(DataType::Null.comparable_with(&DataType::Varchar));
        assert!(DataType::Boolean.comparable_with(&DataType::Null));
    }

    #[test]
    fn incompatible_categories_are_not_comparable() {
        assert!(!DataType::Varchar.comparable_with(&DataType::Integer));
        assert!(!DataType::Date.comparable_with(&DataType::Double));
    }
}
