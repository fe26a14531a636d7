//! Optional bookkeeping of transaction outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Begin, commit, and rollback counts for one queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Debug, Default)]
pub(super) struct Diagnostics {
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl Diagnostics {
    pub(super) fn begin(&self) {
        self.begins.fetch_add(1, Ordering::Relaxed);
    }

    // Called while the transaction lock is still held, so exactly one transaction is in
    // flight and the counts must balance once it is recorded.
    pub(super) fn commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
        self.check();
    }

    pub(super) fn rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.check();
    }

    fn check(&self) {
        let counts = self.counts();
        debug_assert_eq!(
            counts.begins,
            counts.commits + counts.rollbacks,
            "unbalanced transactions"
        );
    }

    pub(super) fn counts(&self) -> Counts {
        Counts {
            begins: self.begins.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}
