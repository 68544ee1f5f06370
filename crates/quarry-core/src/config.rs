//! Execution configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Capacity of every value exchange (items buffered between stages).
    pub pipeline_cap: usize,

    /// Default number of sibling copies for a `Parallel` node.
    pub max_parallelism: usize,

    /// Per-request memory quota in bytes; `None` disables quota accounting.
    pub memory_quota: Option<usize>,

    /// Initial capacity of the ORDER BY buffer.
    pub order_cap: usize,

    /// Maximum number of idle objects retained by each pool.
    pub pool_size: usize,

    /// Errors accepted before the request is stopped; 0 means unlimited.
    pub error_limit: usize,

    /// Stack size for operator threads; `None` keeps the platform default.
    pub thread_stack_bytes: Option<usize>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            pipeline_cap: 512,
            max_parallelism: 4,
            memory_quota: None,
            order_cap: 1024,
            pool_size: 64,
            error_limit: 0,
            thread_stack_bytes: None,
        }
    }
}

impl ExecConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `QUARRY_PIPELINE_CAP`: exchange capacity
    /// - `QUARRY_MAX_PARALLELISM`: default parallel copies
    /// - `QUARRY_MEMORY_QUOTA`: request quota in bytes
    /// - `QUARRY_ORDER_CAP`: initial ORDER BY buffer capacity
    /// - `QUARRY_POOL_SIZE`: idle objects kept per pool
    /// - `QUARRY_ERROR_LIMIT`: error limit (0 = unlimited)
    /// - `QUARRY_THREAD_STACK_BYTES`: operator thread stack size
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_usize("QUARRY_PIPELINE_CAP") {
            cfg.pipeline_cap = v.max(1);
        }

        if let Some(v) = env_usize("QUARRY_MAX_PARALLELISM") {
            cfg.max_parallelism = v.max(1);
        }

        if let Some(v) = env_usize("QUARRY_MEMORY_QUOTA") {
            cfg.memory_quota = Some(v);
        }

        if let Some(v) = env_usize("QUARRY_ORDER_CAP") {
            cfg.order_cap = v.max(1);
        }

        if let Some(v) = env_usize("QUARRY_POOL_SIZE") {
            cfg.pool_size = v;
        }

        if let Some(v) = env_usize("QUARRY_ERROR_LIMIT") {
            cfg.error_limit = v;
        }

        if let Some(v) = env_usize("QUARRY_THREAD_STACK_BYTES") {
            cfg.thread_stack_bytes = Some(v);
        }

        cfg
    }

    /// Builder-style override used by tests and embedders.
    pub fn with_memory_quota(mut self, bytes: usize) -> Self {
        self.memory_quota = Some(bytes);
        self
    }

    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.trim().parse::<usize>().ok()
}
