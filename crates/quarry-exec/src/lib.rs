#![forbid(unsafe_code)]
//! quarry-exec: request runtime on top of the operator crate.
//!
//! `Engine::execute` validates a plan, instantiates the live operator tree,
//! wires the root to a result exchange and runs it on a driver thread. The
//! returned `Execution` is what the session layer holds: a blocking row
//! iterator, stop/pause, `wait` and a JSON profile.

pub mod builder;
pub mod metrics;
pub mod profile;
pub mod runtime;

pub use profile::ProfileVisitor;
pub use runtime::{Engine, EngineError, Execution, Outcome, RequestOptions, Rows};
