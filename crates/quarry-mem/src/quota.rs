//! Per-request memory quota.
//!
//! Rows are charged when a scan produces them and released when a stage
//! merges them away or the session consumes them. Charging never blocks:
//! a failed charge is reported back so the caller can raise a fatal
//! resource error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quarry_core::budget::MemoryQuota;

use crate::error::{Error, Result};
use crate::tracking::PeakTracker;

struct QuotaInner {
    capacity: usize,
    used: AtomicUsize,
    peak: PeakTracker,
}

impl QuotaInner {
    fn try_charge(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.peak.record_used(next);
                return true;
            }
        }
    }

    // Release saturates: a consumer may release rows charged by a producer
    // that already gave some of them back.
    fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }
}

/// Concrete `MemoryQuota` shared by every operator of one request.
#[derive(Clone)]
pub struct RequestQuota {
    inner: Arc<QuotaInner>,
}

impl RequestQuota {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Arc::new(QuotaInner {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
                peak: PeakTracker::new(),
            }),
        }
    }

    /// Like `try_charge`, but reports the overflow as an error.
    pub fn charge(&self, bytes: usize) -> Result<()> {
        if self.inner.try_charge(bytes) {
            Ok(())
        } else {
            Err(Error::QuotaExceeded {
                requested: bytes,
                capacity: self.inner.capacity,
                used: self.used_bytes(),
            })
        }
    }

    /// Highest usage observed so far.
    pub fn peak_bytes(&self) -> usize {
        self.inner.peak.peak()
    }
}

impl std::fmt::Debug for RequestQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQuota")
            .field("capacity", &self.inner.capacity)
            .field("used", &self.used_bytes())
            .field("peak", &self.peak_bytes())
            .finish()
    }
}

impl MemoryQuota for RequestQuota {
    fn try_charge(&self, bytes: usize) -> bool {
        self.inner.try_charge(bytes)
    }

    fn release(&self, bytes: usize) {
        self.inner.release(bytes)
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_leaves_usage_untouched() {
        let q = RequestQuota::new(100);
        assert!(q.try_charge(60));
        assert!(!q.try_charge(41));
        assert_eq!(q.used_bytes(), 60);
        assert!(matches!(q.charge(50), Err(Error::QuotaExceeded { requested: 50, .. })));
    }

    #[test]
    fn release_saturates_and_peak_survives() {
        let q = RequestQuota::new(100);
        q.charge(80).unwrap();
        q.release(30);
        q.release(1_000);
        assert_eq!(q.used_bytes(), 0);
        assert_eq!(q.peak_bytes(), 80);
    }

    #[test]
    fn concurrent_charges_never_exceed_capacity() {
        let q = RequestQuota::new(1_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = q.clone();
                std::thread::spawn(move || (0..500).filter(|_| q.try_charge(3)).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 333);
        assert_eq!(q.used_bytes(), 999);
    }
}
