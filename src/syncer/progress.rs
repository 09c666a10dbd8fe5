use crate::api::{Index, SyncedState, Term};
use std::sync::atomic::{AtomicU64, Ordering};

/// SyncProgress is written by the send loop (and by a completed snapshot restore) and read
/// lock-free by stats callers.
///
/// Term and index are separate cells, so a concurrent reader may pair a new term with an old index.
/// Each cell on its own only moves forward.
pub(super) struct SyncProgress {
    synced_count: AtomicU64,
    synced_term: AtomicU64,
    synced_index: AtomicU64,
}

impl SyncProgress {
    pub(super) fn new() -> Self {
        SyncProgress {
            synced_count: AtomicU64::new(0),
            synced_term: AtomicU64::new(0),
            synced_index: AtomicU64::new(0),
        }
    }

    /// Record `batch_count` batches as forwarded, the last of which was committed at `(term, index)`.
    pub(super) fn record_forwarded(&self, batch_count: u64, term: Term, index: Index) {
        self.synced_count.fetch_add(batch_count, Ordering::Release);
        self.advance_to(term, index);
    }

    pub(super) fn advance_to(&self, term: Term, index: Index) {
        self.synced_term.fetch_max(term.as_u64(), Ordering::AcqRel);
        self.synced_index.fetch_max(index.as_u64(), Ordering::AcqRel);
    }

    pub(super) fn synced_count(&self) -> u64 {
        self.synced_count.load(Ordering::Acquire)
    }

    pub(super) fn synced_state(&self) -> SyncedState {
        SyncedState::new(
            Term::new(self.synced_term.load(Ordering::Acquire)),
            Index::new(self.synced_index.load(Ordering::Acquire)),
        )
    }
}
