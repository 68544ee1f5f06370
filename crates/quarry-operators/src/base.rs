//! State shared by every operator instance: lifecycle gate, liveness flags,
//! exchange endpoints, children, phase clock and item counters.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::context::Context;
use crate::exchange::ValueExchange;
use crate::operator::{OpState, Operator};
use crate::phase::Phase;

struct PhaseClock {
    current: Phase,
    since: Instant,
    totals: [Duration; Phase::ALL.len()],
    entered: [bool; Phase::ALL.len()],
}

impl PhaseClock {
    fn new() -> Self {
        Self {
            current: Phase::Instantiate,
            since: Instant::now(),
            totals: [Duration::ZERO; Phase::ALL.len()],
            entered: [false; Phase::ALL.len()],
        }
    }
}

/// Point-in-time copy of an operator's timing and counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpStats {
    pub items_in: u64,
    pub items_out: u64,
    pub instantiate_time: Duration,
    pub exec_time: Duration,
    pub serv_time: Duration,
    pub sort_time: Duration,
}

pub struct Base {
    state: AtomicU8,
    stopped: AtomicBool,
    paused: AtomicBool,
    input: Mutex<Option<Arc<ValueExchange>>>,
    output: Mutex<Option<Arc<ValueExchange>>>,
    output_delegated: AtomicBool,
    output_closed: AtomicBool,
    children: Mutex<Vec<Arc<Operator>>>,
    clock: Mutex<PhaseClock>,
    items_in: AtomicU64,
    items_out: AtomicU64,
    notified: AtomicBool,
}

impl Base {
    pub(crate) fn new(children: Vec<Arc<Operator>>) -> Self {
        Self {
            state: AtomicU8::new(OpState::NotStarted as u8),
            stopped: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            input: Mutex::new(None),
            output: Mutex::new(None),
            output_delegated: AtomicBool::new(false),
            output_closed: AtomicBool::new(false),
            children: Mutex::new(children),
            clock: Mutex::new(PhaseClock::new()),
            items_in: AtomicU64::new(0),
            items_out: AtomicU64::new(0),
            notified: AtomicBool::new(false),
        }
    }

    // ----- lifecycle -----

    pub fn state(&self) -> OpState {
        OpState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomic state transition; false when the current state is not `from`.
    pub(crate) fn transition(&self, from: OpState, to: OpState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn stop_flag(&self) -> &AtomicBool {
        &self.stopped
    }

    pub(crate) fn raise_stop(&self, pause: bool) {
        if pause {
            self.paused.store(true, Ordering::Release);
        }
        self.stopped.store(true, Ordering::Release);
    }

    /// Clear per-run state ahead of a reopen.
    pub(crate) fn reset(&self) {
        self.stopped.store(false, Ordering::Release);
        self.paused.store(false, Ordering::Release);
        self.output_delegated.store(false, Ordering::Release);
        self.output_closed.store(false, Ordering::Release);
        *self.input.lock() = None;
        *self.output.lock() = None;
        self.notified.store(false, Ordering::Release);
    }

    // ----- wiring -----

    pub fn input(&self) -> Option<Arc<ValueExchange>> {
        self.input.lock().clone()
    }

    pub fn output(&self) -> Option<Arc<ValueExchange>> {
        self.output.lock().clone()
    }

    pub fn set_input(&self, input: Option<Arc<ValueExchange>>) {
        *self.input.lock() = input;
    }

    pub fn set_output(&self, output: Option<Arc<ValueExchange>>) {
        *self.output.lock() = output;
    }

    /// Another operator (last child, parallel copies) closes our output.
    pub(crate) fn delegate_output(&self) {
        self.output_delegated.store(true, Ordering::Release);
    }

    /// Close this instance's producer handle exactly once.
    pub(crate) fn close_output(&self) {
        if self.output_delegated.load(Ordering::Acquire) {
            return;
        }
        if self.output_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(out) = self.output() {
            out.close_producer();
        }
    }

    pub fn children(&self) -> Vec<Arc<Operator>> {
        self.children.lock().clone()
    }

    // ----- items -----

    pub(crate) fn receive(&self) -> Option<quarry_core::annotated::AnnotatedValue> {
        let input = self.input()?;
        let item = input.recv(&self.stopped)?;
        self.items_in.fetch_add(1, Ordering::Relaxed);
        Some(item)
    }

    pub(crate) fn count_out(&self) {
        self.items_out.fetch_add(1, Ordering::Relaxed);
    }

    // ----- phases -----

    /// Charge elapsed time to the current phase and move to `next`.
    pub fn switch_phase(&self, ctx: &Context, next: Phase) {
        let mut clock = self.clock.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(clock.since);
        let cur = clock.current.index();
        clock.totals[cur] += elapsed;
        clock.current = next;
        clock.since = now;
        if next != Phase::Idle && !clock.entered[next.index()] {
            clock.entered[next.index()] = true;
            ctx.add_phase_operator(next);
        }
    }

    pub fn stats(&self) -> OpStats {
        let clock = self.clock.lock();
        OpStats {
            items_in: self.items_in.load(Ordering::Relaxed),
            items_out: self.items_out.load(Ordering::Relaxed),
            instantiate_time: clock.totals[Phase::Instantiate.index()],
            exec_time: clock.totals[Phase::Exec.index()],
            serv_time: clock.totals[Phase::Serv.index()],
            sort_time: clock.totals[Phase::Sort.index()],
        }
    }

    // ----- stop link -----

    pub(crate) fn notify(&self) {
        self.notified.store(true, Ordering::Release);
    }

    /// True once the current run (or `done`) has reached its exit path.
    pub fn is_notified(&self) -> bool {
        self.notified.load(Ordering::Acquire)
    }
}
