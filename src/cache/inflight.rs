use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key fetch serialization.
///
/// The first caller for a key proceeds; later callers for the same key wait
/// until the guard is dropped and can then find the finished entry in the
/// store. Keys nobody holds or waits on are pruned.
#[derive(Debug, Default)]
pub struct InFlight {
    locks: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

/// Held for the duration of one fetch.
#[derive(Debug)]
pub struct FetchGuard {
    _guard: OwnedMutexGuard<()>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FetchGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, weak| weak.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        FetchGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of keys currently held or awaited.
    #[cfg(test)]
    fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn same_key_waits_for_holder() {
        let inflight = Arc::new(InFlight::new());
        let guard = inflight.acquire("k").await;

        let waiter = {
            let inflight = Arc::clone(&inflight);
            tokio::spawn(async move {
                let _guard = inflight.acquire("k").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block() {
        let inflight = InFlight::new();
        let _a = inflight.acquire("a").await;
        let b = timeout(Duration::from_millis(200), inflight.acquire("b")).await;
        assert!(b.is_ok());
        assert_eq!(inflight.active(), 2);
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let inflight = InFlight::new();
        drop(inflight.acquire("a").await);
        assert_eq!(inflight.active(), 0);
        let _b = inflight.acquire("b").await;
        assert_eq!(inflight.locks.lock().unwrap().len(), 1);
    }
}
