use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Per-key one-in-flight coalescing.
///
/// Concurrent callers for the same key share a single execution of the
/// supplied future and all observe its value; callers arriving after the
/// flight lands start a fresh one. Used for OAuth token refresh (keyed by
/// department), sheets bearer tokens, and schedule-sync task submission.
pub struct Singleflight<K, V> {
    inflight: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for Singleflight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Singleflight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Singleflight {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait on the flight already running for it.
    /// If the leading caller is cancelled mid-flight, one of the waiters
    /// takes over with its own `work` future.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut map = self
                .inflight
                .lock()
                .expect("singleflight map lock poisoned");
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = cell.get_or_init(work).await.clone();

        // Retire the landed flight so the next caller starts a new one.
        let mut map = self
            .inflight
            .lock()
            .expect("singleflight map lock poisoned");
        if let Some(current) = map.get(&key) {
            if Arc::ptr_eq(current, &cell) {
                map.remove(&key);
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let group = Arc::new(Singleflight::<&'static str, usize>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let group = group.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                group
                    .run("dept", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_calls_rerun() {
        let group = Singleflight::<u8, u8>::new();
        let first = group.run(1, || async { 1 }).await;
        let second = group.run(1, || async { 2 }).await;
        assert_eq!((first, second), (1, 2));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let group = Arc::new(Singleflight::<u8, u8>::new());
        let a = group.run(1, || async { 10 });
        let b = group.run(2, || async { 20 });
        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), (10, 20));
    }
}
