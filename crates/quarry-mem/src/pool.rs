//! Bounded-reuse object pools.
//!
//! A pool is a free list with a retention limit: `get` pops a previously
//! returned object (or builds a fresh one), `put` clears the object and keeps
//! it only if there is room and it passes the pool's admission check. Pools
//! are plain values; [`Pools::global`] is the lazily built process-wide set,
//! but every engine may construct and inject its own.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use quarry_core::annotated::AnnotatedValue;
use quarry_core::config::ExecConfig;

use crate::error::{Error, Result};

/// Objects that can be reset before going back on a free list.
pub trait Recycle: Send {
    /// Drop every reference the next user must not see.
    fn recycle(&mut self);
}

impl<T: Send> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<T: Send> Recycle for VecDeque<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<K: Send, V: Send> Recycle for HashMap<K, V> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Counters exposed for tests and profiles.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub gets: AtomicU64,
    pub hits: AtomicU64,
    pub puts: AtomicU64,
    pub discarded: AtomicU64,
}

impl PoolStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

type Make<T> = Box<dyn Fn() -> T + Send + Sync>;
type Admit<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

pub struct Pool<T: Recycle> {
    free: Mutex<Vec<T>>,
    limit: usize,
    make: Make<T>,
    admit: Admit<T>,
    stats: PoolStats,
}

impl<T: Recycle> Pool<T> {
    pub fn new(limit: usize, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(limit.min(64))),
            limit,
            make: Box::new(make),
            admit: Box::new(|_| true),
            stats: PoolStats::default(),
        }
    }

    /// Reject returned objects that fail `admit` (e.g. buffers that grew).
    pub fn with_admission(mut self, admit: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.admit = Box::new(admit);
        self
    }

    pub fn get(&self) -> T {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(obj) = self.free.lock().pop() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return obj;
        }
        (self.make)()
    }

    pub fn put(&self, mut obj: T) {
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        if !(self.admit)(&obj) {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        obj.recycle();
        let mut free = self.free.lock();
        if free.len() < self.limit {
            free.push(obj);
        } else {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl<T: Recycle> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("limit", &self.limit)
            .field("idle", &self.idle())
            .finish()
    }
}

pub type RowBuffer = Vec<AnnotatedValue>;
pub type GroupTable = HashMap<String, AnnotatedValue>;
pub type RowQueue = VecDeque<AnnotatedValue>;

/// The pools one engine draws from.
#[derive(Debug)]
pub struct Pools {
    order_cap: usize,
    /// ORDER BY buffers; only buffers of the configured capacity come back.
    pub row_buffers: Pool<RowBuffer>,
    pub group_tables: Pool<GroupTable>,
    pub row_queues: Pool<RowQueue>,
}

impl Pools {
    pub fn new(cfg: &ExecConfig) -> Result<Self> {
        if cfg.order_cap == 0 {
            return Err(Error::PoolConfig("order_cap must be positive".into()));
        }
        if cfg.pipeline_cap == 0 {
            return Err(Error::PoolConfig("pipeline_cap must be positive".into()));
        }
        let order_cap = cfg.order_cap;
        let queue_cap = cfg.pipeline_cap;
        Ok(Self {
            order_cap,
            row_buffers: Pool::new(cfg.pool_size, move || Vec::with_capacity(order_cap))
                .with_admission(move |buf: &RowBuffer| {
                    buf.capacity() >= order_cap && buf.capacity() < order_cap * 2
                }),
            group_tables: Pool::new(cfg.pool_size, HashMap::new),
            row_queues: Pool::new(cfg.pool_size, move || VecDeque::with_capacity(queue_cap))
                .with_admission(move |q: &RowQueue| q.capacity() < queue_cap * 2),
        })
    }

    /// Process-wide default set, created on first use and never torn down.
    pub fn global() -> Arc<Pools> {
        static GLOBAL: Lazy<Arc<Pools>> = Lazy::new(|| {
            let cfg = ExecConfig::from_env();
            let pools = Pools::new(&cfg)
                .or_else(|_| Pools::new(&ExecConfig::default()))
                .unwrap_or_else(|_| Pools::fallback());
            Arc::new(pools)
        });
        Arc::clone(&GLOBAL)
    }

    // Only reachable if the default config itself were invalid.
    fn fallback() -> Self {
        Self {
            order_cap: 1,
            row_buffers: Pool::new(0, Vec::new),
            group_tables: Pool::new(0, HashMap::new),
            row_queues: Pool::new(0, VecDeque::new),
        }
    }

    pub fn order_cap(&self) -> usize {
        self.order_cap
    }
}
