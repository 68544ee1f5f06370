#![forbid(unsafe_code)]
//! quarry-operators: the live half of a query plan.
//!
//! Design intent:
//! - One `Operator` type; what it does is a closed `Stage` enum, so the
//!   lifecycle (run-once gate, panic recovery, phase timing, close/release)
//!   is written exactly once in `operator.rs` and `base.rs`.
//! - Operators talk only through bounded `ValueExchange`s and run on plain OS
//!   threads; there is no async runtime.
//! - Every request-wide concern (errors, quota, counters, cancellation of the
//!   whole tree) goes through the shared `Context`.

pub mod base;
pub mod context;
pub mod datastore;
pub mod error;
pub mod exchange;
pub mod failpoints;
pub mod operator;
pub mod phase;
pub mod visitor;

pub mod alias;
pub mod group;
pub mod index_primary;
pub mod order;
pub mod parallel;
pub mod scan;
pub mod sequence;

pub use context::{Context, ContextBuilder};
pub use datastore::{Datastore, IndexError, Indexer};
pub use error::{ExecError, Result};
pub use exchange::ValueExchange;
pub use operator::{Action, OpState, Operator};
pub use phase::Phase;
pub use visitor::Visitor;
