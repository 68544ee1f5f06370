//! Abstract memory quota interface.
//!
//! The concrete implementation lives in `quarry-mem`. Only the trait sits
//! here so expression and plan code can talk about quota without pulling the
//! accounting machinery in.

/// A per-request byte quota shared by every operator instance of a request.
///
/// Implemented by `quarry-mem`. Charges are advisory bookkeeping (rows are
/// not allocated through the quota), but an operator that fails a charge
/// must stop and report resource exhaustion.
pub trait MemoryQuota: Send + Sync + 'static {
    /// Charge `bytes`; false (and no change) when the quota would overflow.
    fn try_charge(&self, bytes: usize) -> bool;

    /// Return `bytes` to the quota. Saturates at zero.
    fn release(&self, bytes: usize);

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently charged bytes.
    fn used_bytes(&self) -> usize;
}

// NOTE: no blanket "unlimited" impl here. A request without a quota simply
// carries no quota handle.
