//! Shared utilities for the portal client workspace

mod retry;
mod secret;
mod singleflight;

pub use retry::{Epoch, EpochToken, RetryPolicy};
pub use secret::Secret;
pub use singleflight::SingleFlight;
