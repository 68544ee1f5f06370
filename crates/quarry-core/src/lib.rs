#![forbid(unsafe_code)]
//! quarry-core: document values, expressions, aggregates and plan trees.
//!
//! Everything here is pure data plus evaluation; threads, channels and
//! pools live in `quarry-mem` / `quarry-operators`. The plan tree is the
//! immutable, serializable hand-off from the planner: the execution crates
//! turn each `PlanNode` into one (or N parallel) live operator instances.

pub mod aggregate;
pub mod annotated;
pub mod budget;
pub mod config;
pub mod error;
pub mod expr;
pub mod hash;
pub mod id;
pub mod plan;
pub mod prelude;
pub mod value;

pub use error::{Error, Result};

/// Engine version string stamped on profiles.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
