//! Short-TTL caches in front of the store: a room-search cache (TTL ~10ms)
//! and a host-liveness cache (TTL ~1s), both with single-flight coalescing so a cache
//! stampede under load collapses into one store call instead of N.

pub mod host_cache;
pub mod room_cache;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// One cache slot: the last fetched value plus when it was fetched, and a per-key lock
/// so concurrent misses on the same key coalesce into a single fetch. A request-driven
/// TTL cache needs this single-flight guard to avoid a fetch pile-up when many callers
/// miss at once.
struct Slot<V> {
    value: Option<(Instant, V)>,
}

pub(crate) struct TtlCell<V> {
    ttl: Duration,
    slot: Mutex<Slot<V>>,
}

impl<V: Clone> TtlCell<V> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot { value: None }),
        }
    }

    /// Return the cached value if still fresh, otherwise call `fetch` and cache its
    /// result. Holding the slot's lock across the fetch is what gives single-flight
    /// coalescing: a second caller arriving mid-fetch blocks on the lock instead of
    /// issuing its own store call.
    pub(crate) async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut guard = self.slot.lock().await;
        if let Some((fetched_at, value)) = &guard.value {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
        }
        let value = fetch().await?;
        guard.value = Some((Instant::now(), value.clone()));
        Ok(value)
    }

    pub(crate) async fn invalidate(&self) {
        self.slot.lock().await.value = None;
    }
}

pub(crate) fn shared<V>(ttl: Duration) -> Arc<TtlCell<V>> {
    Arc::new(TtlCell::new(ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fetch_runs_once_until_ttl_elapses() {
        let cell: TtlCell<u32> = TtlCell::new(Duration::from_millis(50));
        let calls = AtomicUsize::new(0);

        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(1u32)
        };
        assert_eq!(cell.get_or_fetch(fetch).await.unwrap(), 1);
        assert_eq!(cell.get_or_fetch(fetch).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let cell: TtlCell<u32> = TtlCell::new(Duration::from_secs(10));
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            Ok::<_, anyhow::Error>(n)
        };

        assert_eq!(cell.get_or_fetch(fetch).await.unwrap(), 0);
        cell.invalidate().await;
        assert_eq!(cell.get_or_fetch(fetch).await.unwrap(), 1);
    }
}
