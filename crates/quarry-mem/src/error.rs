use thiserror::Error;

/// Result type local to quarry-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("request memory quota exceeded: requested {requested} bytes, capacity {capacity}, used {used}")]
    QuotaExceeded {
        requested: usize,
        capacity: usize,
        used: usize,
    },

    #[error("invalid pool configuration: {0}")]
    PoolConfig(String),
}
