//! Datastore collaborator interfaces.
//!
//! The execution core never talks to storage directly; DDL operators reach
//! the indexer of a keyspace through these traits.

use std::sync::Arc;

use thiserror::Error;

use quarry_core::plan::IndexPartition;
use quarry_core::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("index {0} already exists")]
    AlreadyExists(String),

    #[error("keyspace {0} not found")]
    KeyspaceNotFound(String),

    #[error("indexer {0} not available")]
    IndexerNotFound(String),

    #[error("{0}")]
    Backend(String),
}

pub trait Indexer: Send + Sync {
    /// Indexer name (`gsi`, `view`, ...).
    fn name(&self) -> &str;

    fn supports_partitions(&self) -> bool;

    fn create_primary_index(
        &self,
        request_id: &str,
        name: &str,
        partition: Option<&IndexPartition>,
        with: Option<&Value>,
    ) -> std::result::Result<(), IndexError>;
}

pub trait Datastore: Send + Sync {
    /// Resolve the indexer named `using` for `keyspace`.
    fn indexer(&self, keyspace: &str, using: &str)
        -> std::result::Result<Arc<dyn Indexer>, IndexError>;
}
