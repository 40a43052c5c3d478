//! Bounded pool of in-flight dialog handlers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Spawns one task per inbound dialog event, with at most `limit`
/// handlers running at once. Spawning never blocks the caller: a task
/// over the limit waits for a permit inside its own future, so the read
/// loop keeps draining the socket.
#[derive(Debug, Clone)]
pub struct DialogPool {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DialogPool {
    pub fn new(limit: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        let guard = InFlight::enter(&self.in_flight);
        self.tracker.spawn(async move {
            let _guard = guard;
            // The semaphore is never closed, so acquire only fails if it is.
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            fut.await;
        });
    }

    /// Handlers spawned and not yet finished, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting work and wait for every handler to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Like [`drain`](Self::drain) but gives up after `grace`.
    /// Returns `true` if everything finished in time.
    pub async fn drain_timeout(&self, grace: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                debug!(remaining = self.in_flight(), "dialog drain timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn runs_every_task() {
        let pool = DialogPool::new(4);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = done.clone();
            pool.spawn(async move {
                tokio::task::yield_now().await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let pool = DialogPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..12 {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.drain().await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_reports_stragglers() {
        let pool = DialogPool::new(1);
        pool.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        assert!(!pool.drain_timeout(Duration::from_secs(1)).await);
        assert_eq!(pool.in_flight(), 1);
    }
}
