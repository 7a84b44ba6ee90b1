//! Schema-bound name resolution.
//!
//! Turns a freshly planned [`crate::logical::LogicalPlan`] into one where
//! every [`crate::expr::Expression`] carries a resolved `schema_column` and
//! `data_type`, consulting a [`SchemaProvider`] for physical `Scan` schemas
//! along the way. The binder never talks to storage directly -- whatever
//! owns the connector registry implements `SchemaProvider` and hands it in.

pub mod bind;
pub mod context;
pub mod expr_bind;

use opteryx_error::Result;
use opteryx_types::RelationSchema;

pub use bind::bind_plan;
pub use context::BindingContext;
pub use expr_bind::Binder;

/// Supplies the physical schema for a named dataset.
pub trait SchemaProvider {
    fn get_dataset_schema(&self, name: &str) -> Result<RelationSchema>;
}
