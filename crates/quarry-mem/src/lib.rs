#![forbid(unsafe_code)]
//! quarry-mem: request memory quota and bounded object pools.
//!
//! The quota is the concrete implementation of `quarry_core::budget::MemoryQuota`;
//! it is the one piece of request state mutated by every operator thread and
//! is lock-free (CAS loop). Pools hand out reusable row buffers, group tables
//! and exchange queues so steady-state execution does not churn the allocator.

pub mod error;
pub mod pool;
pub mod quota;
pub mod tracking;

pub use error::{Error, Result};
pub use pool::{Pool, PoolStats, Pools, Recycle};
pub use quota::RequestQuota;
pub use tracking::PeakTracker;
