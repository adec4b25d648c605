//! Retry policy and generation tokens for restartable retry loops
//!
//! `RetryPolicy` computes a linearly growing, capped delay from the attempt
//! count. `Epoch` hands out snapshot tokens; a retry loop checks its token
//! before each attempt and stops once a reset has moved the epoch on, so
//! superseded loops never overlap with their replacement.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Linear backoff: `delay(n) = base * min(cap, n)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    cap: u32,
}

impl RetryPolicy {
    pub const fn new(base: Duration, cap: u32) -> Self {
        Self { base, cap }
    }

    /// Delay before the n-th retry (1-based). Grows linearly from `base`
    /// up to `base * cap`, then stays at the ceiling.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt.min(self.cap)
    }
}

/// Monotonic generation counter shared between a coordinator and its
/// retry loops.
#[derive(Debug, Clone, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the epoch, invalidating all previously issued tokens.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Snapshot the current generation.
    pub fn token(&self) -> EpochToken {
        EpochToken {
            epoch: self.clone(),
            value: self.0.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of an `Epoch` at loop start.
#[derive(Debug, Clone)]
pub struct EpochToken {
    epoch: Epoch,
    value: u64,
}

impl EpochToken {
    /// Whether the epoch has moved on since this token was issued.
    pub fn is_current(&self) -> bool {
        self.epoch.0.load(Ordering::SeqCst) == self.value
    }
}
