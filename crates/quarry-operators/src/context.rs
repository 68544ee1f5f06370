//! Per-request execution context shared by every operator instance.
//!
//! Cheap to clone (`Arc` inside). Holds the error and warning sinks, the
//! fatal flag, the optional memory quota, request counters and the handle on
//! the root operator used to stop the whole tree.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value as Json};
use tracing::warn;

use quarry_core::annotated::AnnotatedValue;
use quarry_core::budget::MemoryQuota;
use quarry_core::config::ExecConfig;
use quarry_core::id::RequestId;
use quarry_mem::Pools;

use crate::datastore::Datastore;
use crate::error::{ExecError, Result};
use crate::exchange::ValueExchange;
use crate::operator::{Action, Operator};
use crate::phase::Phase;

#[derive(Default)]
struct Diagnostics {
    errors: Vec<ExecError>,
    error_count: usize,
    duplicate_count: usize,
    warnings: Vec<ExecError>,
}

struct ContextInner {
    request_id: RequestId,
    config: ExecConfig,
    pools: Arc<Pools>,
    quota: Option<Arc<dyn MemoryQuota>>,
    datastore: Option<Arc<dyn Datastore>>,
    readonly: bool,
    fatal: AtomicBool,
    halted: AtomicBool,
    diagnostics: Mutex<Diagnostics>,
    sort_count: AtomicU64,
    mutation_count: AtomicU64,
    phase_counts: [AtomicU64; Phase::ALL.len()],
    phase_operators: [AtomicU64; Phase::ALL.len()],
    root: Mutex<Option<Weak<Operator>>>,
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

pub struct ContextBuilder {
    config: ExecConfig,
    pools: Option<Arc<Pools>>,
    quota: Option<Arc<dyn MemoryQuota>>,
    datastore: Option<Arc<dyn Datastore>>,
    readonly: bool,
    request_id: Option<RequestId>,
}

impl ContextBuilder {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            pools: None,
            quota: None,
            datastore: None,
            readonly: false,
            request_id: None,
        }
    }

    pub fn pools(mut self, pools: Arc<Pools>) -> Self {
        self.pools = Some(pools);
        self
    }

    pub fn quota(mut self, quota: Arc<dyn MemoryQuota>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.datastore = Some(datastore);
        self
    }

    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    pub fn request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                request_id: self.request_id.unwrap_or_default(),
                config: self.config,
                pools: self.pools.unwrap_or_else(Pools::global),
                quota: self.quota,
                datastore: self.datastore,
                readonly: self.readonly,
                fatal: AtomicBool::new(false),
                halted: AtomicBool::new(false),
                diagnostics: Mutex::new(Diagnostics::default()),
                sort_count: AtomicU64::new(0),
                mutation_count: AtomicU64::new(0),
                phase_counts: Default::default(),
                phase_operators: Default::default(),
                root: Mutex::new(None),
            }),
        }
    }
}

impl Context {
    pub fn builder(config: ExecConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }

    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    pub fn config(&self) -> &ExecConfig {
        &self.inner.config
    }

    pub fn pools(&self) -> &Arc<Pools> {
        &self.inner.pools
    }

    /// Exchange on this request's pools that gives dropped rows back to the
    /// request quota.
    pub fn exchange(&self, cap: usize) -> Arc<ValueExchange> {
        ValueExchange::tracked(cap, Arc::clone(&self.inner.pools), self.inner.quota.clone())
    }

    pub fn datastore(&self) -> Option<&Arc<dyn Datastore>> {
        self.inner.datastore.as_ref()
    }

    pub fn readonly(&self) -> bool {
        self.inner.readonly
    }

    // ----- errors -----

    /// Record an error. Identical errors (code and message) are kept once;
    /// reaching the error limit appends `ErrorLimit` and stops the request.
    pub fn error(&self, err: ExecError) {
        let limit = self.inner.config.error_limit;
        let mut diag = self.inner.diagnostics.lock();
        if limit > 0 && diag.error_count + diag.duplicate_count >= limit {
            let already = matches!(diag.errors.last(), Some(ExecError::ErrorLimit(_)));
            if !already {
                diag.errors.push(ExecError::ErrorLimit(limit));
                diag.error_count += 1;
            }
            drop(diag);
            self.inner.fatal.store(true, Ordering::Release);
            self.stop_root();
            return;
        }
        let code = err.code();
        let message = err.to_string();
        if diag
            .errors
            .iter()
            .any(|e| e.code() == code && e.to_string() == message)
        {
            diag.duplicate_count += 1;
            return;
        }
        warn!(request = %self.inner.request_id, code, %message, "request error");
        diag.errors.push(err);
        diag.error_count += 1;
    }

    /// Error plus stop of the whole request.
    pub fn fatal(&self, err: ExecError) {
        self.error(err);
        self.inner.fatal.store(true, Ordering::Release);
        self.stop_root();
    }

    /// Warnings; `once_only` drops repeats of the same code and message.
    pub fn warning(&self, wrn: ExecError, once_only: bool) {
        let mut diag = self.inner.diagnostics.lock();
        if once_only {
            let code = wrn.code();
            let message = wrn.to_string();
            if diag
                .warnings
                .iter()
                .any(|w| w.code() == code && w.to_string() == message)
            {
                return;
            }
        }
        diag.warnings.push(wrn);
    }

    pub fn is_fatal(&self) -> bool {
        self.inner.fatal.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> Vec<ExecError> {
        self.inner.diagnostics.lock().errors.clone()
    }

    pub fn warnings(&self) -> Vec<ExecError> {
        self.inner.diagnostics.lock().warnings.clone()
    }

    pub fn error_count(&self) -> usize {
        self.inner.diagnostics.lock().error_count
    }

    pub fn duplicate_error_count(&self) -> usize {
        self.inner.diagnostics.lock().duplicate_count
    }

    /// Convert a caught panic payload into a fatal error.
    pub fn recover(&self, operator: &str, payload: Box<dyn Any + Send>) {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        warn!(request = %self.inner.request_id, operator, %message, "recovered operator panic");
        self.fatal(ExecError::Panic {
            operator: operator.to_string(),
            message,
        });
    }

    // ----- cancellation -----

    /// Root of the live operator tree; stopping the request stops it.
    pub fn set_root(&self, root: &Arc<Operator>) {
        *self.inner.root.lock() = Some(Arc::downgrade(root));
    }

    /// Stop the whole tree. Only the first call has an effect.
    pub fn stop_root(&self) {
        if self.inner.halted.swap(true, Ordering::AcqRel) {
            return;
        }
        let root = self.inner.root.lock().as_ref().and_then(Weak::upgrade);
        if let Some(root) = root {
            root.send_action(Action::Stop);
        }
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::Acquire)
    }

    // ----- quota -----

    pub fn uses_quota(&self) -> bool {
        self.inner.quota.is_some()
    }

    /// Charge `bytes` against the request quota (no-op without one).
    pub fn track_value_size(&self, bytes: usize) -> Result<()> {
        match &self.inner.quota {
            Some(q) if !q.try_charge(bytes) => Err(ExecError::MemoryQuotaExceeded {
                requested: bytes,
                capacity: q.capacity_bytes(),
            }),
            _ => Ok(()),
        }
    }

    pub fn release_value_size(&self, bytes: usize) {
        if let Some(q) = &self.inner.quota {
            q.release(bytes);
        }
    }

    /// A charged row is dropped without being delivered.
    pub fn discard(&self, item: AnnotatedValue) {
        if self.uses_quota() {
            self.release_value_size(item.size());
        }
    }

    /// A row changed shape in place: swap its old charge for the new one.
    pub fn retrack_value_size(&self, before: usize, after: usize) -> Result<()> {
        if !self.uses_quota() {
            return Ok(());
        }
        self.release_value_size(before);
        self.track_value_size(after)
    }

    pub fn quota_used(&self) -> Option<usize> {
        self.inner.quota.as_ref().map(|q| q.used_bytes())
    }

    // ----- counters -----

    pub fn set_sort_count(&self, n: u64) {
        self.inner.sort_count.store(n, Ordering::Relaxed);
    }

    pub fn sort_count(&self) -> u64 {
        self.inner.sort_count.load(Ordering::Relaxed)
    }

    pub fn add_mutation_count(&self, n: u64) {
        self.inner.mutation_count.fetch_add(n, Ordering::Relaxed);
    }

    pub fn mutation_count(&self) -> u64 {
        self.inner.mutation_count.load(Ordering::Relaxed)
    }

    pub fn add_phase_count(&self, phase: Phase, n: u64) {
        self.inner.phase_counts[phase.index()].fetch_add(n, Ordering::Relaxed);
    }

    pub fn phase_count(&self, phase: Phase) -> u64 {
        self.inner.phase_counts[phase.index()].load(Ordering::Relaxed)
    }

    pub fn add_phase_operator(&self, phase: Phase) {
        self.inner.phase_operators[phase.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn phase_operators(&self, phase: Phase) -> u64 {
        self.inner.phase_operators[phase.index()].load(Ordering::Relaxed)
    }

    /// Non-zero phase counts as a JSON object (`None` when all are zero).
    pub fn fmt_phase_counts(&self) -> Option<Json> {
        fmt_phases(&self.inner.phase_counts)
    }

    pub fn fmt_phase_operators(&self) -> Option<Json> {
        fmt_phases(&self.inner.phase_operators)
    }
}

fn fmt_phases(counters: &[AtomicU64; Phase::ALL.len()]) -> Option<Json> {
    let mut out = Map::new();
    for phase in Phase::ALL {
        let n = counters[phase.index()].load(Ordering::Relaxed);
        if n > 0 {
            out.insert(phase.name().to_string(), Json::from(n));
        }
    }
    (!out.is_empty()).then_some(Json::Object(out))
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.inner.request_id)
            .field("readonly", &self.inner.readonly)
            .field("fatal", &self.is_fatal())
            .finish()
    }
}
