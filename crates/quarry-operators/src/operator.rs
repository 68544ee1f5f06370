//! The operator: one lifecycle, many stages.
//!
//! Every live operator is an [`Operator`] whose behavior is picked by a
//! closed [`Stage`] enum built from its plan node. The lifecycle below is the
//! only execution entry point:
//!
//! ```text
//! NotStarted --run--> Running --(body returns / panics)--> Stopped --done--> Done
//!      |                                                      |
//!      +------------------------- done ----------------------+
//!      ^                                                      |
//!      +------------------------ reopen ---------------------+
//! ```
//!
//! `run` passes a compare-and-swap gate, so concurrent or repeated calls
//! execute the body at most once. Whatever happens inside, the exit path
//! releases pooled buffers, notifies the stop link, switches the phase clock
//! to idle and closes the output handle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use quarry_core::annotated::{AnnotatedValue, ScopeRef};
use quarry_core::id::OpId;
use quarry_core::plan::{PlanNode, PlanOp};
use quarry_mem::Pools;

use crate::alias::Alias;
use crate::base::{Base, OpStats};
use crate::context::Context;
use crate::error::Result;
use crate::exchange::ValueExchange;
use crate::group::{Group, GroupKind};
use crate::index_primary::CreatePrimaryIndex;
use crate::order::Order;
use crate::parallel::Parallel;
use crate::phase::Phase;
use crate::scan::{DummyScan, ExpressionScan};
use crate::sequence::Sequence;
use crate::visitor::Visitor;

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpState {
    NotStarted = 0,
    Running = 1,
    Stopped = 2,
    Done = 3,
}

impl OpState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => OpState::NotStarted,
            1 => OpState::Running,
            2 => OpState::Stopped,
            _ => OpState::Done,
        }
    }
}

/// Control actions pushed down the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    /// Halts like `Stop`, but the operator reports itself as paused.
    Pause,
}

pub(crate) enum Stage {
    DummyScan(DummyScan),
    ExpressionScan(ExpressionScan),
    Alias(Alias),
    Group(Group),
    Order(Order),
    CreatePrimaryIndex(CreatePrimaryIndex),
    Sequence(Sequence),
    Parallel(Parallel),
}

impl Stage {
    fn new(plan: &PlanNode) -> Self {
        match &plan.op {
            PlanOp::DummyScan => Stage::DummyScan(DummyScan),
            PlanOp::ExpressionScan(spec) => Stage::ExpressionScan(ExpressionScan::new(spec)),
            PlanOp::Alias(spec) => Stage::Alias(Alias::new(spec)),
            PlanOp::InitialGroup(spec) => Stage::Group(Group::new(GroupKind::Initial, spec)),
            PlanOp::IntermediateGroup(spec) => {
                Stage::Group(Group::new(GroupKind::Intermediate, spec))
            }
            PlanOp::FinalGroup(spec) => Stage::Group(Group::new(GroupKind::Final, spec)),
            PlanOp::Order(spec) => Stage::Order(Order::new(spec)),
            PlanOp::CreatePrimaryIndex(spec) => {
                Stage::CreatePrimaryIndex(CreatePrimaryIndex::new(spec))
            }
            PlanOp::Sequence { .. } => Stage::Sequence(Sequence),
            PlanOp::Parallel { .. } => Stage::Parallel(Parallel),
        }
    }

    /// Return pooled buffers; per-run state is gone afterwards. Expression
    /// scan caches survive.
    fn release(&mut self, pools: &Pools) {
        match self {
            Stage::Group(s) => s.release(pools),
            Stage::Order(s) => s.release(pools),
            Stage::Alias(s) => s.reset(),
            _ => {}
        }
    }
}

/// Generic consumer skeleton shared by every stage with an input.
pub(crate) trait ConsumerStage {
    fn before_items(&mut self, _op: &Operator, _ctx: &Context, _parent: Option<&ScopeRef>) -> bool {
        true
    }

    /// Handle one input row; false stops consumption.
    fn process_item(&mut self, op: &Operator, ctx: &Context, item: AnnotatedValue) -> bool;

    fn after_items(&mut self, _op: &Operator, _ctx: &Context) {}
}

pub struct Operator {
    id: OpId,
    plan: Arc<PlanNode>,
    pools: Arc<Pools>,
    base: Base,
    stage: Mutex<Stage>,
}

impl Operator {
    fn with_children(plan: Arc<PlanNode>, pools: Arc<Pools>, children: Vec<Arc<Operator>>) -> Self {
        let stage = Stage::new(&plan);
        Self {
            id: OpId::new(NEXT_OP_ID.fetch_add(1, Ordering::Relaxed)),
            plan,
            pools,
            base: Base::new(children),
            stage: Mutex::new(stage),
        }
    }

    /// Instantiate the live tree for `plan`. Parallel nodes get their copies
    /// here; exchanges are wired when composites run.
    pub fn from_plan(plan: &Arc<PlanNode>, ctx: &Context) -> Result<Arc<Operator>> {
        let children = match &plan.op {
            PlanOp::Sequence { children } => children
                .iter()
                .map(|c| Operator::from_plan(c, ctx))
                .collect::<Result<Vec<_>>>()?,
            PlanOp::Parallel {
                child,
                max_parallelism,
            } => {
                let n = match *max_parallelism {
                    0 => ctx.config().max_parallelism,
                    n => n,
                }
                .max(1);
                let first = Operator::from_plan(child, ctx)?;
                let mut copies = Vec::with_capacity(n);
                for _ in 1..n {
                    copies.push(first.copy());
                }
                copies.insert(0, first);
                copies
            }
            _ => Vec::new(),
        };
        Ok(Arc::new(Operator::with_children(
            Arc::clone(plan),
            Arc::clone(ctx.pools()),
            children,
        )))
    }

    /// Sibling instance: same plan, fresh state, copied children. The copy
    /// is wired to the same exchanges; a caller that runs both must register
    /// the extra producer handle on the shared output.
    pub fn copy(&self) -> Arc<Operator> {
        let children = self.base.children().iter().map(|c| c.copy()).collect();
        let op = Operator::with_children(Arc::clone(&self.plan), Arc::clone(&self.pools), children);
        op.wire(self.base.input(), self.base.output());
        Arc::new(op)
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.plan.kind_name()
    }

    pub fn plan(&self) -> &Arc<PlanNode> {
        &self.plan
    }

    pub fn base(&self) -> &Base {
        &self.base
    }

    pub fn state(&self) -> OpState {
        self.base.state()
    }

    pub fn stats(&self) -> OpStats {
        self.base.stats()
    }

    pub fn children(&self) -> Vec<Arc<Operator>> {
        self.base.children()
    }

    /// Wire both endpoints in one go.
    pub fn wire(&self, input: Option<Arc<ValueExchange>>, output: Option<Arc<ValueExchange>>) {
        self.base.set_input(input);
        self.base.set_output(output);
    }

    /// Execute the body at most once.
    pub fn run(self: &Arc<Self>, ctx: &Context, parent: Option<ScopeRef>) {
        if !self.base.transition(OpState::NotStarted, OpState::Running) {
            return;
        }
        debug!(op = self.name(), id = self.id.get(), "operator started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.base.switch_phase(ctx, Phase::Exec);
            self.run_stage(ctx, parent);
        }));
        if let Err(payload) = outcome {
            ctx.recover(self.name(), payload);
        }

        self.stage.lock().release(&self.pools);
        // Nothing reads our input past this point; unblock its producer.
        if let Some(input) = self.base.input() {
            input.abandon();
        }
        self.base.notify();
        self.base.switch_phase(ctx, Phase::Idle);
        self.base.close_output();
        self.base.transition(OpState::Running, OpState::Stopped);
        debug!(op = self.name(), id = self.id.get(), "operator finished");
    }

    fn run_stage(self: &Arc<Self>, ctx: &Context, parent: Option<ScopeRef>) {
        if !self.base.is_active() {
            return;
        }
        let mut stage = self.stage.lock();
        match &mut *stage {
            Stage::DummyScan(s) => s.run(self, ctx, parent),
            Stage::ExpressionScan(s) => s.run(self, ctx, parent),
            Stage::CreatePrimaryIndex(s) => s.run(self, ctx),
            Stage::Alias(s) => self.run_consumer(s, ctx, parent),
            Stage::Group(s) => self.run_consumer(s, ctx, parent),
            Stage::Order(s) => self.run_consumer(s, ctx, parent),
            Stage::Sequence(s) => s.run(self, ctx, parent),
            Stage::Parallel(s) => s.run(self, ctx, parent),
        }
    }

    fn run_consumer<S: ConsumerStage>(&self, stage: &mut S, ctx: &Context, parent: Option<ScopeRef>) {
        if !stage.before_items(self, ctx, parent.as_ref()) {
            return;
        }
        while let Some(item) = self.base.receive() {
            if ctx.is_fatal() {
                ctx.discard(item);
                break;
            }
            if !stage.process_item(self, ctx, item) {
                break;
            }
        }
        stage.after_items(self, ctx);
    }

    /// Deliver one row downstream; false once nobody wants more.
    pub fn send_item(&self, ctx: &Context, item: AnnotatedValue) -> bool {
        if !self.base.is_active() || ctx.is_fatal() {
            ctx.discard(item);
            return false;
        }
        let Some(out) = self.base.output() else {
            ctx.discard(item);
            return false;
        };
        // A failed send releases the row's charge inside the exchange.
        if out.send(item, self.base.stop_flag()) {
            self.base.count_out();
            true
        } else {
            false
        }
    }

    /// Charge a freshly produced row against the request quota; an overflow
    /// is fatal.
    pub(crate) fn track_row(&self, ctx: &Context, item: &AnnotatedValue) -> bool {
        if !ctx.uses_quota() {
            return true;
        }
        match ctx.track_value_size(item.size()) {
            Ok(()) => true,
            Err(e) => {
                ctx.fatal(e);
                false
            }
        }
    }

    /// Raise the liveness flag here and in every descendant, then wake any
    /// endpoint blocked on our exchanges.
    pub fn send_action(&self, action: Action) {
        self.base.raise_stop(action == Action::Pause);
        for child in self.base.children() {
            child.send_action(action);
        }
        if let Some(input) = self.base.input() {
            input.abandon();
        }
        if let Some(output) = self.base.output() {
            output.wake();
        }
    }

    /// Reset to run again. False while running or after `done`.
    pub fn reopen(&self) -> bool {
        match self.base.state() {
            OpState::Running | OpState::Done => return false,
            OpState::NotStarted | OpState::Stopped => {}
        }
        for child in self.base.children() {
            if !child.reopen() {
                return false;
            }
        }
        self.stage.lock().release(&self.pools);
        self.base.reset();
        self.base.transition(OpState::Stopped, OpState::NotStarted)
            || self.base.state() == OpState::NotStarted
    }

    /// Idempotent release. An operator that never ran still closes its
    /// output handle so its consumer sees end-of-stream.
    pub fn done(&self) {
        loop {
            let cur = self.base.state();
            match cur {
                OpState::Done | OpState::Running => return,
                OpState::NotStarted | OpState::Stopped => {
                    if self.base.transition(cur, OpState::Done) {
                        break;
                    }
                }
            }
        }
        for child in self.base.children() {
            child.done();
        }
        self.stage.lock().release(&self.pools);
        self.base.close_output();
        self.base.notify();
    }

    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match &self.plan.op {
            PlanOp::DummyScan => visitor.visit_dummy_scan(self),
            PlanOp::ExpressionScan(_) => visitor.visit_expression_scan(self),
            PlanOp::Alias(_) => visitor.visit_alias(self),
            PlanOp::InitialGroup(_) => visitor.visit_initial_group(self),
            PlanOp::IntermediateGroup(_) => visitor.visit_intermediate_group(self),
            PlanOp::FinalGroup(_) => visitor.visit_final_group(self),
            PlanOp::Order(_) => visitor.visit_order(self),
            PlanOp::CreatePrimaryIndex(_) => visitor.visit_create_primary_index(self),
            PlanOp::Sequence { .. } => visitor.visit_sequence(self),
            PlanOp::Parallel { .. } => visitor.visit_parallel(self),
        }
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("id", &self.id)
            .field("kind", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
