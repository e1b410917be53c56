mod batch;
mod delete;
mod get;
mod key_condition;
mod paginate;
mod parallel_scan;
mod put;
mod query;
mod scan;
mod update;
mod version;

#[cfg(test)]
mod testing;

pub use batch::{BatchGet, BatchGetOptions, BatchWrite, TableReadOptions, WriteOp};
pub use delete::DeleteOptions;
pub use get::GetOptions;
pub use key_condition::{KeyCondition, KeyPredicate};
pub use parallel_scan::{ParallelScan, SegmentState};
pub use put::PutOptions;
pub use query::{QueryIter, QueryOptions, QueryPages};
pub use scan::{ScanIter, ScanOptions, ScanPages};
pub use update::{OnMissing, UpdateOptions};

use std::sync::Arc;
use store::StoreClient;

/// The `<package>/<version>` identity this library presents to the store.
/// Pass it as `ClientConfig::user_agent` when constructing the HTTP client;
/// the string is an observable part of the client contract.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A single-item Get produced no result. Carries the full request for
    /// diagnosis.
    #[error("the requested item was not found")]
    ItemNotFound { request: Box<store::GetItemRequest> },
    /// An Update succeeded but the response lacked the guaranteed ALL_NEW
    /// attributes.
    #[error("the store returned no attributes for the updated item")]
    NoReturnedAttributes,
    #[error("a parallel scan requires between 1 and 1000000 segments, not {0}")]
    InvalidSegmentCount(u32),
    #[error("scan state holds {actual} segments but the scan was launched with {expected}")]
    InvalidScanState { expected: usize, actual: usize },
    #[error(transparent)]
    Marshal(#[from] marshal::Error),
    #[error(transparent)]
    Expression(#[from] expressions::Error),
    /// Any store-client failure other than unprocessed batch items,
    /// propagated verbatim.
    #[error(transparent)]
    Transport(#[from] store::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Read consistency of Get, Query, Scan, and batch Get operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConsistency {
    #[default]
    Eventual,
    Strong,
}

impl ReadConsistency {
    pub(crate) fn is_strong(&self) -> bool {
        matches!(self, ReadConsistency::Strong)
    }
}

/// Mapper-level configuration. Per-operation options override these.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub read_consistency: ReadConsistency,
    /// Suppress synthesized version conditions and increments (but not the
    /// initialization of new items' versions).
    #[serde(default)]
    pub skip_version_check: bool,
    /// Prepended to every table name, e.g. "staging-".
    #[serde(default)]
    pub table_name_prefix: String,
}

/// Mapper translates between application objects and store items, and drives
/// the store's RPCs: single-item CRUD, queries and scans, and streaming
/// batch operations.
#[derive(Clone)]
pub struct Mapper {
    client: Arc<dyn StoreClient>,
    config: MapperConfig,
}

impl Mapper {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self::with_config(client, MapperConfig::default())
    }

    pub fn with_config(client: Arc<dyn StoreClient>, config: MapperConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// The physical table name of an Object, with the configured prefix.
    pub(crate) fn table_name(&self, object: &marshal::Object) -> String {
        object.table_name(&self.config.table_name_prefix)
    }

    pub(crate) fn consistent_read(&self, per_op: Option<ReadConsistency>) -> bool {
        per_op.unwrap_or(self.config.read_consistency).is_strong()
    }

    pub(crate) fn skip_version_check(&self, per_op: Option<bool>) -> bool {
        per_op.unwrap_or(self.config.skip_version_check)
    }
}

/// The delay before a throttled table's unprocessed elements are retried:
/// uniformly random in [0, 2^factor) milliseconds.
pub(crate) fn backoff(factor: u32) -> std::time::Duration {
    use rand::Rng;
    let ceiling = 1u64 << factor.min(16);
    std::time::Duration::from_millis(rand::thread_rng().gen_range(0..ceiling))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff_bounds() {
        for factor in 0..10 {
            for _ in 0..100 {
                let delay = backoff(factor);
                assert!(delay.as_millis() < (1u128 << factor).max(1));
            }
        }
        // factor 0 always yields a zero delay.
        assert_eq!(backoff(0), std::time::Duration::ZERO);
    }

    #[test]
    fn test_user_agent_names_this_library() {
        // The identity handed to ClientConfig carries this package's own
        // name and version, not the transport crate's.
        assert_eq!(USER_AGENT, concat!("mapper/", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_config_parsing() {
        let config: MapperConfig = serde_json::from_value(serde_json::json!({
            "read_consistency": "strong",
            "table_name_prefix": "staging-",
        }))
        .unwrap();

        assert_eq!(config.read_consistency, ReadConsistency::Strong);
        assert!(!config.skip_version_check);
        assert_eq!(config.table_name_prefix, "staging-");

        let config: MapperConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.read_consistency, ReadConsistency::Eventual);
    }
}
