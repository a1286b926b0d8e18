//! Global document epoch shared by every component of one viewer

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::Epoch;

/// Monotonically increasing document token.
///
/// Cloning shares the underlying counter. Work tagged with an epoch other
/// than [`EpochClock::current`] belongs to a document that is gone.
#[derive(Clone, Debug, Default)]
pub struct EpochClock {
    current: Arc<AtomicU64>,
}

impl EpochClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Epoch {
        self.current.load(Ordering::Acquire)
    }

    /// Start a new epoch, invalidating everything tagged with older ones
    pub fn advance(&self) -> Epoch {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[must_use]
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }
}
