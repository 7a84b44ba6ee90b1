//! Storage connector contract (§6.3).
//!
//! Concrete connectors -- S3, GCS, a SQL backend, Iceberg, MongoDB -- are
//! out of scope for the compilation pipeline; this module only fixes the
//! trait boundary the binder and the external physical executor agree on,
//! and the registry that maps a dataset name to a connector instance.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use opteryx_error::{OpteryxError, Result};
use opteryx_types::{ColumnStatistics, DataType, RelationSchema};

use crate::binder::SchemaProvider;
use crate::expr::{ComparisonOperator, Expression};
use crate::stats::PruneReport;

/// A single morsel of rows handed back by `read_dataset`. The compilation
/// pipeline never inspects one -- it only threads the type through to the
/// (external) physical executor.
pub trait Batch: Send {}

/// Hint a caller can pass to `Cacheable::read_blob` to bypass the cache.
pub const NO_CACHE_HINT: &str = "NO_CACHE";

/// The capability every connector must provide.
pub trait Connector: Send + Sync {
    fn get_dataset_schema(&self) -> Result<RelationSchema>;

    fn read_dataset(
        &self,
        columns: &[String],
        predicates: &[Expression],
        limit: Option<u64>,
    ) -> Result<Box<dyn Iterator<Item = Box<dyn Batch>>>>;
}

/// Accepts a `FOR`-clause temporal range and knows how to enumerate the
/// blobs that fall inside it.
pub trait Partitionable: Connector {
    fn get_blobs_in_partition(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<Vec<String>>;
}

/// Wraps `read_blob` with a caching decorator; respects [`NO_CACHE_HINT`].
pub trait Cacheable: Connector {
    fn read_blob(&self, blob_name: &str, hints: &[String]) -> Result<Box<dyn Batch>>;
}

/// Predicate pushdown: which operators and types a connector accepts, and
/// the hook that receives the pushable subset of a plan's predicates.
pub trait PredicatePushable: Connector {
    fn pushable_ops(&self) -> &'static [ComparisonOperator];
    fn pushable_types(&self) -> &'static [DataType];
    fn push_predicates(&self, predicates: &[Expression]);
}

/// Receives a row limit to push into the read.
pub trait LimitPushable: Connector {
    fn push_limit(&self, limit: u64);
}

/// Per-column statistics for blob pruning (§4.8).
pub trait Statistics: Connector {
    fn read_blob_statistics(&self, blob_name: &str) -> Result<HashMap<String, ColumnStatistics>>;
    fn prune_blobs(&self, blobs: &[String], predicates: &[Expression]) -> Result<PruneReport>;
}

/// Offers an async variant of blob reads for connectors whose backend is
/// naturally non-blocking; the planner itself never awaits anything.
pub trait Asynchronous: Connector {
    fn async_read_blob<'a>(
        &'a self,
        blob_name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Batch>>> + Send + 'a>>;
}

/// Accepts temporal start/end dates forwarded from the planner's `Scan`
/// node, returning a connector instance scoped to that range.
pub trait Diachronic: Connector {
    fn with_temporal_range(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Arc<dyn Connector>;
}

type ConnectorFactory = dyn Fn() -> Arc<dyn Connector> + Send + Sync;

/// Maps dataset names (possibly dotted, e.g. `iceberg.default.orders`) to a
/// connector instance per a registration table. A registry also implements
/// [`SchemaProvider`], so the binder can consult it directly.
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    factories: HashMap<String, Arc<ConnectorFactory>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `dataset_prefix` -- the leading dotted
    /// segment of a dataset name (`iceberg` in `iceberg.default.orders`),
    /// or the bare dataset name for single-segment names like `$planets`.
    pub fn register(
        &mut self,
        dataset_prefix: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Connector> + Send + Sync + 'static,
    ) {
        self.factories.insert(dataset_prefix.into(), Arc::new(factory));
    }

    pub fn connect(&self, name: &str) -> Result<Arc<dyn Connector>> {
        let prefix = name.split('.').next().unwrap_or(name);
        self.factories
            .get(prefix)
            .or_else(|| self.factories.get(name))
            .map(|factory| factory())
            .ok_or_else(|| OpteryxError::dataset_not_found(name))
    }
}

impl SchemaProvider for ConnectorRegistry {
    fn get_dataset_schema(&self, name: &str) -> Result<RelationSchema> {
        self.connect(name)?.get_dataset_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubConnector;

    impl Connector for StubConnector {
        fn get_dataset_schema(&self) -> Result<RelationSchema> {
            Ok(RelationSchema::new("stub"))
        }

        fn read_dataset(
            &self,
            _columns: &[String],
            _predicates: &[Expression],
            _limit: Option<u64>,
        ) -> Result<Box<dyn Iterator<Item = Box<dyn Batch>>>> {
            Ok(Box::new(std::iter::empty()))
        }
    }

    #[test]
    fn unregistered_dataset_reports_not_found() {
        let registry = ConnectorRegistry::new();
        let err = registry.connect("$unknown").unwrap_err();
        assert_eq!(err.kind, opteryx_error::ErrorKind::DatasetNotFound);
    }

    #[test]
    fn dotted_name_resolves_by_leading_prefix() {
        let mut registry = ConnectorRegistry::new();
        registry.register("iceberg", || Arc::new(StubConnector));
        assert!(registry.connect("iceberg.default.orders").is_ok());
    }
}
