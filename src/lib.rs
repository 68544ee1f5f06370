#![forbid(unsafe_code)]
//! quarry: streaming execution core for a document query engine.
//!
//! Facade over the workspace crates:
//! - `core`: values, expressions, aggregates, plan trees, configuration
//! - `mem`: object pools and the request memory quota
//! - `operators`: the live operator tree, value exchanges, request context
//! - `exec`: the engine that runs a plan and hands back an `Execution`

pub use quarry_core as core;
pub use quarry_exec as exec;
pub use quarry_mem as mem;
pub use quarry_operators as operators;

pub use quarry_core::config::ExecConfig;
pub use quarry_core::plan::{PlanNode, PlanOp};
pub use quarry_core::value::Value;
pub use quarry_exec::{Engine, EngineError, Execution, Outcome, RequestOptions};
pub use quarry_operators::{Context, ExecError};

/// Run `plan` to completion on `engine` and return its rows and outcome.
pub fn run_to_completion(
    engine: &Engine,
    plan: &std::sync::Arc<PlanNode>,
    opts: RequestOptions,
) -> Result<(Vec<Value>, Outcome), EngineError> {
    let mut exec = engine.execute(plan, opts)?;
    let rows = exec.collect();
    let outcome = exec.wait();
    Ok((rows, outcome))
}
