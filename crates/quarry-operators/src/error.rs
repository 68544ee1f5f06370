use thiserror::Error;

/// Result type local to quarry-operators.
pub type Result<T> = std::result::Result<T, ExecError>;

/// Errors reported to the request context.
///
/// `code()` is stable and, together with the message, identifies an error
/// for de-duplication.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("Error evaluating {what}: {cause}")]
    Evaluation { what: String, cause: String },

    #[error("Duplicate final group: {key}")]
    DuplicateFinalGroup { key: String },

    #[error("Error updating group: {0}")]
    GroupUpdate(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Request memory quota exceeded: requested {requested} bytes, capacity {capacity}")]
    MemoryQuotaExceeded { requested: usize, capacity: usize },

    #[error("The index {0} already exists.")]
    IndexAlreadyExists(String),

    #[error("PARTITION BY is not supported by indexer {0}.")]
    PartitionIndexNotSupported(String),

    #[error("Datastore error: {0}")]
    Datastore(String),

    #[error("Panic in operator {operator}: {message}")]
    Panic { operator: String, message: String },

    #[error("Number of errors exceeds the maximum ({0})")]
    ErrorLimit(usize),

    #[error("Invalid plan: {0}")]
    Plan(String),

    #[error("Failed to start operator thread: {0}")]
    Thread(String),
}

impl ExecError {
    pub fn evaluation(what: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        ExecError::Evaluation {
            what: what.to_string(),
            cause: cause.to_string(),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ExecError::Plan(_) => 4000,
            ExecError::IndexAlreadyExists(_) => 4300,
            ExecError::Panic { .. } => 5001,
            ExecError::Thread(_) => 5002,
            ExecError::Evaluation { .. } => 5010,
            ExecError::InvalidValue(_) => 5040,
            ExecError::GroupUpdate(_) => 5060,
            ExecError::DuplicateFinalGroup { .. } => 5070,
            ExecError::PartitionIndexNotSupported(_) => 5300,
            ExecError::MemoryQuotaExceeded { .. } => 5500,
            ExecError::ErrorLimit(_) => 5600,
            ExecError::Datastore(_) => 12000,
        }
    }
}

impl From<quarry_mem::Error> for ExecError {
    fn from(e: quarry_mem::Error) -> Self {
        match e {
            quarry_mem::Error::QuotaExceeded {
                requested,
                capacity,
                ..
            } => ExecError::MemoryQuotaExceeded {
                requested,
                capacity,
            },
            other => ExecError::Plan(other.to_string()),
        }
    }
}

impl From<quarry_core::Error> for ExecError {
    fn from(e: quarry_core::Error) -> Self {
        match e {
            quarry_core::Error::Plan(msg) | quarry_core::Error::Config(msg) => ExecError::Plan(msg),
            other => ExecError::evaluation("expression", other),
        }
    }
}
