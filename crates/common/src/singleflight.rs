//! At-most-one-in-flight deduplication for async operations
//!
//! Maps an operation key to its in-flight future. Callers arriving while an
//! operation is pending join the existing flight and observe the same output;
//! the entry is removed once the flight settles so the next call starts
//! fresh. The output type must be `Clone` since every joined caller receives
//! its own copy.

use std::collections::HashMap;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

struct Flight<T: Clone> {
    seq: u64,
    shared: Shared<BoxFuture<'static, T>>,
}

/// Keyed single-flight table.
///
/// Invariant: for any key, at most one underlying future started through
/// `run` is outstanding at a time, regardless of caller concurrency.
pub struct SingleFlight<T: Clone> {
    inflight: Mutex<Inner<T>>,
}

struct Inner<T: Clone> {
    seq: u64,
    flights: HashMap<&'static str, Flight<T>>,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(Inner {
                seq: 0,
                flights: HashMap::new(),
            }),
        }
    }

    /// Join the in-flight operation under `key`, or start one via `factory`.
    ///
    /// The factory is only invoked when no flight is pending for the key.
    /// Settlement removes the entry, guarded by a sequence number so a
    /// caller finishing late never evicts a newer flight started under the
    /// same key.
    pub async fn run<F, Fut>(&self, key: &'static str, factory: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (seq, shared) = {
            let mut inner = self.inflight.lock().await;
            match inner.flights.get(key) {
                Some(flight) => (flight.seq, flight.shared.clone()),
                None => {
                    inner.seq += 1;
                    let seq = inner.seq;
                    let shared = factory().boxed().shared();
                    inner.flights.insert(
                        key,
                        Flight {
                            seq,
                            shared: shared.clone(),
                        },
                    );
                    (seq, shared)
                }
            }
        };

        let out = shared.await;

        let mut inner = self.inflight.lock().await;
        if inner.flights.get(key).is_some_and(|f| f.seq == seq) {
            inner.flights.remove(key);
        }
        out
    }

    /// Number of flights currently pending.
    pub async fn pending(&self) -> usize {
        self.inflight.lock().await.flights.len()
    }
}
