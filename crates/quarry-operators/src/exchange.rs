//! Bounded value exchange between a producing stage and its consumer(s).
//!
//! One mutex-guarded queue with two condition variables. Producers block
//! while the queue is full, consumers while it is empty; both waits also end
//! when the caller's stop flag is raised (the stopping side calls
//! [`ValueExchange::wake`] or [`ValueExchange::abandon`] under the same
//! lock, so no wake-up is lost). The exchange reaches end-of-stream once the
//! last producer handle has closed; nothing is accepted after that.
//!
//! A tracked exchange gives the quota charge of every row it drops (failed
//! sends, abandoned or leftover queue) back to the request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use quarry_core::annotated::AnnotatedValue;
use quarry_core::budget::MemoryQuota;
use quarry_mem::pool::RowQueue;
use quarry_mem::Pools;

struct ExchangeState {
    queue: RowQueue,
    producers: usize,
    closes: usize,
    abandoned: bool,
}

pub struct ValueExchange {
    state: Mutex<ExchangeState>,
    not_empty: Condvar,
    not_full: Condvar,
    cap: usize,
    pools: Arc<Pools>,
    quota: Option<Arc<dyn MemoryQuota>>,
}

impl ValueExchange {
    /// New exchange with one producer handle.
    pub fn new(cap: usize, pools: Arc<Pools>) -> Arc<Self> {
        Self::tracked(cap, pools, None)
    }

    /// New exchange that releases dropped rows against `quota`.
    pub fn tracked(
        cap: usize,
        pools: Arc<Pools>,
        quota: Option<Arc<dyn MemoryQuota>>,
    ) -> Arc<Self> {
        let queue = pools.row_queues.get();
        Arc::new(Self {
            state: Mutex::new(ExchangeState {
                queue,
                producers: 1,
                closes: 0,
                abandoned: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            cap: cap.max(1),
            pools,
            quota,
        })
    }

    fn release<'a>(&self, rows: impl IntoIterator<Item = &'a AnnotatedValue>) {
        if let Some(q) = &self.quota {
            q.release(rows.into_iter().map(AnnotatedValue::size).sum());
        }
    }

    /// Register `n` more producer handles (fan-in from sibling copies).
    pub fn add_producers(&self, n: usize) {
        let mut st = self.state.lock();
        if st.producers > 0 {
            st.producers += n;
        }
    }

    /// Blocking send. False when the consumer went away, the exchange is
    /// closed, or `stop` was raised while waiting.
    pub fn send(&self, item: AnnotatedValue, stop: &AtomicBool) -> bool {
        let mut st = self.state.lock();
        loop {
            if st.abandoned || st.producers == 0 || stop.load(Ordering::Acquire) {
                drop(st);
                self.release([&item]);
                return false;
            }
            if st.queue.len() < self.cap {
                st.queue.push_back(item);
                self.not_empty.notify_one();
                return true;
            }
            self.not_full.wait(&mut st);
        }
    }

    /// Blocking receive. `None` at end-of-stream, when abandoned, or when
    /// `stop` was raised.
    pub fn recv(&self, stop: &AtomicBool) -> Option<AnnotatedValue> {
        let mut st = self.state.lock();
        loop {
            if st.abandoned || stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(item) = st.queue.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if st.producers == 0 {
                return None;
            }
            self.not_empty.wait(&mut st);
        }
    }

    /// Close one producer handle. Extra calls after end-of-stream are ignored.
    pub fn close_producer(&self) {
        let mut st = self.state.lock();
        if st.producers == 0 {
            return;
        }
        st.producers -= 1;
        st.closes += 1;
        if st.producers == 0 {
            self.not_empty.notify_all();
            self.not_full.notify_all();
        }
    }

    /// The consumer no longer wants input: drop what is queued and fail
    /// every pending and future send.
    pub fn abandon(&self) {
        let mut st = self.state.lock();
        st.abandoned = true;
        self.release(st.queue.iter());
        st.queue.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Wake every blocked endpoint so it re-checks its stop flag.
    pub fn wake(&self) {
        let _st = self.state.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().producers == 0
    }

    pub fn is_abandoned(&self) -> bool {
        self.state.lock().abandoned
    }

    /// Number of producer handles closed so far.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }
}

impl Drop for ValueExchange {
    fn drop(&mut self) {
        let queue = std::mem::take(&mut self.state.get_mut().queue);
        self.release(queue.iter());
        self.pools.row_queues.put(queue);
    }
}

impl std::fmt::Debug for ValueExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("ValueExchange")
            .field("cap", &self.cap)
            .field("queued", &st.queue.len())
            .field("producers", &st.producers)
            .field("abandoned", &st.abandoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::config::ExecConfig;
    use quarry_core::value::Value;
    use std::thread;
    use std::time::Duration;

    fn pools() -> Arc<Pools> {
        Arc::new(Pools::new(&ExecConfig::default()).unwrap())
    }

    #[test]
    fn end_of_stream_waits_for_every_producer() {
        let x = ValueExchange::new(4, pools());
        x.add_producers(1);
        let stop = AtomicBool::new(false);
        assert!(x.send(AnnotatedValue::new(Value::Int(1)), &stop));
        x.close_producer();
        assert!(!x.is_closed());
        x.close_producer();
        x.close_producer();
        assert!(x.is_closed());
        assert_eq!(x.close_count(), 2);
        assert_eq!(x.recv(&stop).map(|v| v.into_value()), Some(Value::Int(1)));
        assert!(x.recv(&stop).is_none());
        assert!(!x.send(AnnotatedValue::default(), &stop));
    }

    #[test]
    fn blocked_producer_wakes_on_stop() {
        let x = ValueExchange::new(1, pools());
        let stop = Arc::new(AtomicBool::new(false));
        let (x2, stop2) = (Arc::clone(&x), Arc::clone(&stop));
        let producer = thread::spawn(move || {
            let first = x2.send(AnnotatedValue::default(), &stop2);
            let second = x2.send(AnnotatedValue::default(), &stop2);
            (first, second)
        });
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::Release);
        x.wake();
        assert_eq!(producer.join().unwrap(), (true, false));
    }

    #[test]
    fn tracked_exchange_releases_dropped_rows() {
        let quota = Arc::new(quarry_mem::quota::RequestQuota::new(1 << 16));
        let x = ValueExchange::tracked(2, pools(), Some(quota.clone() as Arc<dyn MemoryQuota>));
        let stop = AtomicBool::new(false);
        let row = || AnnotatedValue::new(Value::from("payload"));
        for _ in 0..3 {
            assert!(quota.try_charge(row().size()));
        }
        assert!(x.send(row(), &stop));
        assert!(x.send(row(), &stop));
        x.abandon();
        assert!(!x.send(row(), &stop));
        assert_eq!(quota.used_bytes(), 0);
    }

    #[test]
    fn abandon_fails_pending_sends() {
        let x = ValueExchange::new(1, pools());
        let stop = AtomicBool::new(false);
        assert!(x.send(AnnotatedValue::default(), &stop));
        x.abandon();
        assert!(!x.send(AnnotatedValue::default(), &stop));
        assert!(x.recv(&stop).is_none());
    }
}
