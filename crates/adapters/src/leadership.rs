// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeadershipError {
    #[error("leadership claim failed: {0}")]
    Claim(String),
}

/// Source of truth for whether this unit leads its application.
#[async_trait]
pub trait LeadershipTracker: Clone + Send + Sync + 'static {
    /// Last known leadership status
    fn is_leader(&self) -> bool;

    /// Claim or renew the leadership lease.
    ///
    /// Returns whether this unit holds leadership afterwards.
    async fn claim_leader(&self) -> Result<bool, LeadershipError>;

    /// Leadership flips, starting with the current value
    fn subscribe(&self) -> watch::Receiver<bool>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{LeadershipError, LeadershipTracker};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::watch;

    /// Leadership tracker whose status tests flip by hand
    #[derive(Clone)]
    pub struct FakeLeadership {
        tx: Arc<watch::Sender<bool>>,
        claimable: Arc<AtomicBool>,
        claims: Arc<AtomicUsize>,
    }

    impl Default for FakeLeadership {
        fn default() -> Self {
            Self::new(false)
        }
    }

    impl FakeLeadership {
        pub fn new(leader: bool) -> Self {
            let (tx, _rx) = watch::channel(leader);
            Self {
                tx: Arc::new(tx),
                claimable: Arc::new(AtomicBool::new(true)),
                claims: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn set_leader(&self, leader: bool) {
            self.tx.send_replace(leader);
        }

        /// Whether a claim by a non-leader succeeds
        pub fn set_claimable(&self, claimable: bool) {
            self.claimable.store(claimable, Ordering::SeqCst);
        }

        pub fn claims(&self) -> usize {
            self.claims.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LeadershipTracker for FakeLeadership {
        fn is_leader(&self) -> bool {
            *self.tx.borrow()
        }

        async fn claim_leader(&self) -> Result<bool, LeadershipError> {
            self.claims.fetch_add(1, Ordering::SeqCst);
            if !self.is_leader() && self.claimable.load(Ordering::SeqCst) {
                self.tx.send_replace(true);
            }
            Ok(self.is_leader())
        }

        fn subscribe(&self) -> watch::Receiver<bool> {
            self.tx.subscribe()
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLeadership;
