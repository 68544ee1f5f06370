//! Runtime: turn a plan into a running request and hand the session a handle.
//!
//! - One driver thread runs the root operator; composites spawn their own
//!   children from there.
//! - The root writes into a bounded result exchange that `Execution` reads.
//! - Rows handed to the caller are released from the request quota.
//! - Dropping an `Execution` stops the tree and joins the driver.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, warn};

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::config::ExecConfig;
use quarry_core::hash::{hash_serde, Hash256};
use quarry_core::id::RequestId;
use quarry_core::plan::PlanNode;
use quarry_core::value::Value;
use quarry_mem::{Pools, RequestQuota};
use quarry_operators::{Action, Context, Datastore, ExecError, Operator, ValueExchange};

use crate::builder;
use crate::metrics::emit_span;
use crate::profile::ProfileVisitor;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid plan: {0}")]
    Plan(#[from] quarry_core::Error),
    #[error("operator setup: {0}")]
    Operator(#[from] ExecError),
    #[error("hashing error: {0}")]
    Hash(String),
    #[error("driver thread: {0}")]
    Thread(String),
}

/// Per-request knobs supplied by the session layer.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub readonly: bool,
    /// Enclosing row for correlated sub-plans.
    pub parent: Option<ScopeRef>,
    /// Overrides `ExecConfig::memory_quota` for this request.
    pub memory_quota: Option<usize>,
    pub request_id: Option<RequestId>,
}

/// Engine owns the configuration, the pool set and the datastore handle.
pub struct Engine {
    config: ExecConfig,
    pools: Arc<Pools>,
    datastore: Option<Arc<dyn Datastore>>,
}

impl Engine {
    /// Engine on the process-wide pool set.
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            pools: Pools::global(),
            datastore: None,
        }
    }

    /// Engine on a dedicated pool set sized from `config`.
    pub fn with_own_pools(config: ExecConfig) -> Result<Self, EngineError> {
        let pools = Pools::new(&config).map_err(ExecError::from)?;
        Ok(Self {
            config,
            pools: Arc::new(pools),
            datastore: None,
        })
    }

    pub fn with_pools(mut self, pools: Arc<Pools>) -> Self {
        self.pools = pools;
        self
    }

    pub fn with_datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn pools(&self) -> &Arc<Pools> {
        &self.pools
    }

    /// Build and start `plan`. Rows become readable through the returned
    /// handle as soon as the root produces them.
    pub fn execute(
        &self,
        plan: &Arc<PlanNode>,
        opts: RequestOptions,
    ) -> Result<Execution, EngineError> {
        let plan_hash = hash_serde(plan.as_ref()).map_err(|e| EngineError::Hash(e.to_string()))?;

        let quota = opts
            .memory_quota
            .or(self.config.memory_quota)
            .map(RequestQuota::new);
        let mut cb = Context::builder(self.config.clone())
            .pools(Arc::clone(&self.pools))
            .readonly(opts.readonly);
        if let Some(q) = &quota {
            cb = cb.quota(Arc::new(q.clone()));
        }
        if let Some(ds) = &self.datastore {
            cb = cb.datastore(Arc::clone(ds));
        }
        if let Some(id) = opts.request_id {
            cb = cb.request_id(id);
        }
        let ctx = cb.build();

        let root = builder::build(plan, &ctx)?;
        ctx.set_root(&root);
        let output = ctx.exchange(self.config.pipeline_cap);
        root.wire(None, Some(Arc::clone(&output)));

        emit_span(
            "request.start",
            &[
                ("request_id", ctx.request_id().to_string()),
                ("plan_hash", plan_hash.to_hex()),
                ("root", root.name().to_string()),
            ],
        );

        let mut thread = std::thread::Builder::new().name(format!("quarry-driver-{}", ctx.request_id()));
        if let Some(stack) = self.config.thread_stack_bytes {
            thread = thread.stack_size(stack);
        }
        let (r, c, parent) = (Arc::clone(&root), ctx.clone(), opts.parent);
        let driver = match thread.spawn(move || r.run(&c, parent)) {
            Ok(h) => h,
            Err(e) => {
                root.done();
                return Err(EngineError::Thread(e.to_string()));
            }
        };

        Ok(Execution {
            ctx,
            root,
            output,
            driver: Some(driver),
            plan_hash,
            quota,
            reader_stop: AtomicBool::new(false),
        })
    }
}

/// Final state of a request once every operator has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub errors: Vec<ExecError>,
    pub warnings: Vec<ExecError>,
    pub fatal: bool,
    pub mutation_count: u64,
    pub sort_count: u64,
    pub peak_memory: Option<usize>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A running request.
pub struct Execution {
    ctx: Context,
    root: Arc<Operator>,
    output: Arc<ValueExchange>,
    driver: Option<JoinHandle<()>>,
    plan_hash: Hash256,
    quota: Option<RequestQuota>,
    reader_stop: AtomicBool,
}

impl Execution {
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn root(&self) -> &Arc<Operator> {
        &self.root
    }

    pub fn plan_hash(&self) -> Hash256 {
        self.plan_hash
    }

    /// True once the root operator has finished; `wait` still joins.
    pub fn is_finished(&self) -> bool {
        self.root.base().is_notified()
    }

    /// Next result row; `None` at end-of-stream.
    pub fn next_row(&self) -> Option<AnnotatedValue> {
        let row = self.output.recv(&self.reader_stop)?;
        // The row leaves the engine here.
        self.ctx.release_value_size(row.size());
        Some(row)
    }

    pub fn rows(&self) -> Rows<'_> {
        Rows { exec: self }
    }

    /// Drain every row and return the plain values.
    pub fn collect(&self) -> Vec<Value> {
        self.rows().map(AnnotatedValue::into_value).collect()
    }

    /// Cancel the request. Rows already read stay read.
    pub fn stop(&self) {
        debug!(request = %self.ctx.request_id(), "stop requested");
        self.ctx.stop_root();
        self.output.abandon();
    }

    /// Halt like `stop`; operators report themselves as paused.
    pub fn pause(&self) {
        debug!(request = %self.ctx.request_id(), "pause requested");
        self.root.send_action(Action::Pause);
        self.output.abandon();
    }

    /// Discard unread rows and block until every operator has finished.
    pub fn wait(&mut self) -> Outcome {
        self.output.abandon();
        self.join();
        self.outcome()
    }

    /// Snapshot of errors and counters; complete only after `wait`.
    pub fn outcome(&self) -> Outcome {
        Outcome {
            errors: self.ctx.errors(),
            warnings: self.ctx.warnings(),
            fatal: self.ctx.is_fatal(),
            mutation_count: self.ctx.mutation_count(),
            sort_count: self.ctx.sort_count(),
            peak_memory: self.quota.as_ref().map(RequestQuota::peak_bytes),
        }
    }

    /// JSON view of the operator tree with timings and estimates.
    pub fn profile(&self) -> serde_json::Value {
        let mut visitor = ProfileVisitor::default();
        let plan = self.root.accept(&mut visitor);
        visitor.request_profile(&self.ctx, self.plan_hash, plan)
    }

    fn join(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        if driver.join().is_err() {
            warn!(request = %self.ctx.request_id(), "driver thread terminated abnormally");
        }
        self.root.done();
        emit_span(
            "request.end",
            &[
                ("request_id", self.ctx.request_id().to_string()),
                ("errors", self.ctx.error_count().to_string()),
                ("mutations", self.ctx.mutation_count().to_string()),
            ],
        );
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.stop();
            self.join();
        }
    }
}

/// Blocking iterator over result rows.
pub struct Rows<'a> {
    exec: &'a Execution,
}

impl Iterator for Rows<'_> {
    type Item = AnnotatedValue;

    fn next(&mut self) -> Option<Self::Item> {
        self.exec.next_row()
    }
}
