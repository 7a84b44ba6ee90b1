pub mod datatype;
pub mod schema;
pub mod value;

pub use datatype::{DataType, TypeCategory};
pub use schema::{ColumnDef, ColumnId, ColumnIdAllocator, ColumnKind, ColumnStatistics, RelationSchema};
pub use value::Value;
