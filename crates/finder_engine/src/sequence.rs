use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::task::AbortHandle;

use crate::lock;

/// Hands out monotonically increasing request numbers.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    latest: Arc<AtomicU64>,
}

/// One issued request. Its response may only be applied while it is current.
#[derive(Debug, Clone)]
pub struct RequestTicket {
    seq: u64,
    latest: Arc<AtomicU64>,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestTicket {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            seq,
            latest: Arc::clone(&self.latest),
        }
    }
}

impl RequestTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// No newer request was issued since this one.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.seq
    }
}

/// Runs requests for one logical resource so that only the latest result is
/// ever returned.
///
/// Starting a request aborts the one still in flight, and a result that
/// resolves after a newer request was issued is dropped.
#[derive(Debug, Default)]
pub struct LatestOnly {
    sequencer: RequestSequencer,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl LatestOnly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `request` as the latest request. `None` means it was superseded.
    pub async fn run<F, T>(&self, request: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let ticket = self.sequencer.issue();
        let handle = tokio::spawn(request);
        let _guard = AbortOnDrop(handle.abort_handle());
        if let Some(previous) = lock(&self.in_flight).replace(handle.abort_handle()) {
            previous.abort();
        }

        let result = handle.await;
        if !ticket.is_current() {
            tracing::debug!("Dropping stale response #{}", ticket.seq());
            return None;
        }
        lock(&self.in_flight).take();
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("Request #{} did not complete: {}", ticket.seq(), err);
                None
            }
        }
    }

    /// Abort whatever is in flight and invalidate its result.
    pub fn cancel(&self) {
        self.sequencer.issue();
        if let Some(previous) = lock(&self.in_flight).take() {
            previous.abort();
        }
    }
}

/// Aborts the request when the caller stops waiting for it.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Owner side of a liveness flag: the flag is cleared when the scope drops.
#[derive(Debug)]
pub struct ViewScope {
    alive: Arc<AtomicBool>,
}

/// Checked by asynchronous work before it touches view state.
#[derive(Debug, Clone)]
pub struct Liveness {
    alive: Arc<AtomicBool>,
}

impl ViewScope {
    pub fn new() -> Self {
        ViewScope {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn liveness(&self) -> Liveness {
        Liveness {
            alive: Arc::clone(&self.alive),
        }
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.close();
    }
}

impl Liveness {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_only_the_latest_ticket_is_current() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.issue();
        assert!(first.is_current());

        let second = sequencer.issue();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.seq() > first.seq());
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_request_supersedes_slower_one() {
        let latest = LatestOnly::new();

        let slow = latest.run(async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            "slow"
        });
        let fast = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            latest
                .run(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    "fast"
                })
                .await
        };

        let (slow, fast) = tokio::join!(slow, fast);
        assert_eq!(slow, None);
        assert_eq!(fast, Some("fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_request_is_aborted() {
        let latest = LatestOnly::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let request = latest.run(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(10), request)
                .await
                .is_err()
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_request_aborts_the_first() {
        let latest = LatestOnly::new();
        // The first request never gets to run before the second one is issued.
        let first = latest.run(async { 1 });
        let second = latest.run(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            2
        });
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, None);
        assert_eq!(second, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_invalidates_in_flight_request() {
        let latest = LatestOnly::new();
        let request = latest.run(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            42
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            latest.cancel();
        };
        let (result, ()) = tokio::join!(request, cancel);
        assert_eq!(result, None);
    }

    #[test]
    fn test_liveness_follows_the_scope() {
        let scope = ViewScope::new();
        let liveness = scope.liveness();
        assert!(liveness.is_alive());
        drop(scope);
        assert!(!liveness.is_alive());
    }
}
