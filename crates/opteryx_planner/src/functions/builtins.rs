//! The builtin function table.

use opteryx_types::DataType;

use super::{FunctionMode, FunctionSignature};

macro_rules! scalar {
    ($name:literal, $min:literal, $max:expr, $ret:expr) => {
        FunctionSignature {
            name: $name,
            mode: FunctionMode::Scalar,
            min_args: $min,
            max_args: $max,
            return_type: $ret,
            aliased_to: None,
        }
    };
}

macro_rules! aggregate {
    ($name:literal, $ret:expr) => {
        FunctionSignature {
            name: $name,
            mode: FunctionMode::Aggregate,
            min_args: 1,
            max_args: Some(1),
            return_type: $ret,
            aliased_to: None,
        }
    };
}

macro_rules! constant {
    ($name:literal, $ret:expr) => {
        FunctionSignature {
            name: $name,
            mode: FunctionMode::Constant,
            min_args: 0,
            max_args: Some(0),
            return_type: $ret,
            aliased_to: None,
        }
    };
}

macro_rules! alias {
    ($name:literal, $target:literal) => {
        FunctionSignature {
            name: $name,
            mode: FunctionMode::Alias,
            min_args: 0,
            max_args: None,
            return_type: DataType::Missing,
            aliased_to: Some($target),
        }
    };
}

/// Keep this list the single source of truth for which names are
/// aggregates -- `logical::planner` consults [`super::FunctionCatalogue`]
/// rather than keeping its own copy.
pub static BUILTINS: &[FunctionSignature] = &[
    // string
    scalar!("UPPER", 1, Some(1), DataType::Varchar),
    scalar!("LOWER", 1, Some(1), DataType::Varchar),
    scalar!("LENGTH", 1, Some(1), DataType::Integer),
    scalar!("TRIM", 1, Some(3), DataType::Varchar),
    scalar!("LTRIM", 1, Some(2), DataType::Varchar),
    scalar!("RTRIM", 1, Some(2), DataType::Varchar),
    scalar!("SUBSTRING", 2, Some(3), DataType::Varchar),
    scalar!("CONCAT", 1, None, DataType::Varchar),
    scalar!("REPLACE", 3, Some(3), DataType::Varchar),
    scalar!("SPLIT", 2, Some(2), DataType::Array(Box::new(DataType::Varchar))),
    scalar!("STARTS_WITH", 2, Some(2), DataType::Boolean),
    scalar!("ENDS_WITH", 2, Some(2), DataType::Boolean),
    // numeric
    scalar!("ABS", 1, Some(1), DataType::Double),
    scalar!("ROUND", 1, Some(2), DataType::Double),
    scalar!("CEIL", 1, Some(1), DataType::Double),
    scalar!("FLOOR", 1, Some(1), DataType::Double),
    scalar!("POWER", 2, Some(2), DataType::Double),
    scalar!("SQRT", 1, Some(1), DataType::Double),
    scalar!("MOD", 2, Some(2), DataType::Double),
    scalar!("SIGN", 1, Some(1), DataType::Integer),
    // conditional / coercion
    scalar!("COALESCE", 1, None, DataType::Missing),
    scalar!("NULLIF", 2, Some(2), DataType::Missing),
    scalar!("CAST", 1, Some(1), DataType::Missing),
    scalar!("TRY_CAST", 1, Some(1), DataType::Missing),
    scalar!("CASE", 1, None, DataType::Missing),
    scalar!("EXISTS", 1, Some(1), DataType::Boolean),
    scalar!("NOT_EXISTS", 1, Some(1), DataType::Boolean),
    // temporal
    scalar!("DATE_TRUNC", 2, Some(2), DataType::Date),
    scalar!("DATE_DIFF", 3, Some(3), DataType::Integer),
    scalar!("DATE_ADD", 3, Some(3), DataType::Date),
    scalar!("EXTRACT", 2, Some(2), DataType::Integer),
    // array / struct
    scalar!("UNNEST", 1, Some(1), DataType::Missing),
    scalar!("ARRAY_CONTAINS", 2, Some(2), DataType::Boolean),
    scalar!("GENERATE_SERIES", 2, Some(3), DataType::Array(Box::new(DataType::Integer))),
    // aggregates
    aggregate!("SUM", DataType::Double),
    aggregate!("COUNT", DataType::Integer),
    aggregate!("AVG", DataType::Double),
    aggregate!("MIN", DataType::Missing),
    aggregate!("MAX", DataType::Missing),
    aggregate!("STDDEV", DataType::Double),
    aggregate!("VARIANCE", DataType::Double),
    aggregate!("ARRAY_AGG", DataType::Array(Box::new(DataType::Missing))),
    aggregate!("FIRST", DataType::Missing),
    aggregate!("LAST", DataType::Missing),
    aggregate!("LIST", DataType::Array(Box::new(DataType::Missing))),
    aggregate!("APPROXIMATE_MEDIAN", DataType::Double),
    aggregate!("COUNT_DISTINCT", DataType::Integer),
    // constants
    constant!("PI", DataType::Double),
    constant!("E", DataType::Double),
    constant!("NOW", DataType::Timestamp),
    constant!("CURRENT_DATE", DataType::Date),
    constant!("CURRENT_TIME", DataType::Time),
    constant!("VERSION", DataType::Varchar),
    // aliases
    alias!("CHAR_LENGTH", "LENGTH"),
    alias!("CHARACTER_LENGTH", "LENGTH"),
    alias!("IFNULL", "COALESCE"),
    alias!("POW", "POWER"),
];
