//! Wake guard around in-flight commands.
//!
//! Radio commands must keep the platform awake from dispatch until the
//! reply lands, otherwise the device can suspend with the modem mid-
//! transaction. The guard refcounts acquisitions across all in-flight
//! commands and holds the underlying [`WakeSource`] while the count is
//! nonzero.
//!
//! A watchdog timer bounds the hold: if no activity rearms it within the
//! timeout, the guard force-releases so a wedged modem cannot pin the
//! device awake forever. Replies that arrive after a force release are
//! still delivered; their guard release becomes a no-op.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

/// How long the guard may stay held with no rearm before force release.
pub const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(60);

/// Platform hook the guard drives.
///
/// `acquire` is called on the 0 to 1 refcount transition, `release` on the
/// 1 to 0 transition (or on force release). Both run under the guard's
/// internal lock and must not call back into the guard.
pub trait WakeSource: Send + Sync + 'static {
    fn acquire(&self);
    fn release(&self);
}

/// Wake source that does nothing, for hosts without suspend.
#[derive(Debug, Default)]
pub struct NoopWake;

impl WakeSource for NoopWake {
    fn acquire(&self) {}
    fn release(&self) {}
}

#[derive(Debug)]
struct GuardState {
    refcount: u32,
    // Bumped on every rearm; a timer whose generation no longer matches
    // fired against an old window and must not act.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Refcounted hold on a [`WakeSource`] with a force-release watchdog.
pub struct ResourceGuard {
    state: Mutex<GuardState>,
    source: Arc<dyn WakeSource>,
    timeout: Duration,
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("refcount", &self.refcount())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResourceGuard {
    /// Creates a guard over `source` with the given watchdog timeout.
    pub fn new(source: Arc<dyn WakeSource>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GuardState {
                refcount: 0,
                generation: 0,
                timer: None,
            }),
            source,
            timeout,
        })
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes one hold on the guard and rearms the watchdog.
    pub fn acquire(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.refcount == 0 {
            self.source.acquire();
        }
        state.refcount += 1;
        self.rearm(&mut state);
    }

    /// Drops one hold. Releasing at zero is a no-op: replies that arrive
    /// after a watchdog force release still call this.
    pub fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.refcount == 0 {
            tracing::debug!("Wake guard release at zero refcount ignored");
            return;
        }
        state.refcount -= 1;
        if state.refcount == 0 {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            self.source.release();
        }
    }

    /// True while at least one hold is outstanding.
    pub fn held(&self) -> bool {
        self.lock().refcount > 0
    }

    /// Current number of holds.
    pub fn refcount(&self) -> u32 {
        self.lock().refcount
    }

    fn rearm(self: &Arc<Self>, state: &mut GuardState) {
        state.generation += 1;
        let generation = state.generation;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let weak = Arc::downgrade(self);
        let timeout = self.timeout;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(guard) = weak.upgrade() {
                guard.on_idle_timeout(generation);
            }
        }));
    }

    fn on_idle_timeout(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation || state.refcount == 0 {
            // A rearm or final release beat the timer to the lock.
            return;
        }
        tracing::warn!(
            "Forcing wake release after {:?} idle with {} holds outstanding",
            self.timeout,
            state.refcount
        );
        state.refcount = 0;
        state.timer = None;
        self.source.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct CountingWake {
        acquires: AtomicU32,
        releases: AtomicU32,
    }

    impl WakeSource for CountingWake {
        fn acquire(&self) {
            self.acquires.fetch_add(1, Ordering::SeqCst);
        }
        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingWake {
        fn counts(&self) -> (u32, u32) {
            (
                self.acquires.load(Ordering::SeqCst),
                self.releases.load(Ordering::SeqCst),
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refcount_drives_source_edges() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), DEFAULT_GUARD_TIMEOUT);

        guard.acquire();
        guard.acquire();
        assert_eq!(wake.counts(), (1, 0));
        assert_eq!(guard.refcount(), 2);

        guard.release();
        assert!(guard.held());
        assert_eq!(wake.counts(), (1, 0));

        guard.release();
        assert!(!guard.held());
        assert_eq!(wake.counts(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_forces_release() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), Duration::from_secs(60));

        guard.acquire();
        assert!(guard.held());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!guard.held());
        assert_eq!(wake.counts(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_force_release_is_noop() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), Duration::from_secs(60));

        guard.acquire();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(wake.counts(), (1, 1));

        // The late reply's release must not underflow or double-release.
        guard.release();
        assert_eq!(wake.counts(), (1, 1));
        assert_eq!(guard.refcount(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reacquire_after_timeout() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), Duration::from_secs(60));

        guard.acquire();
        tokio::time::sleep(Duration::from_secs(61)).await;

        guard.acquire();
        assert!(guard.held());
        assert_eq!(wake.counts(), (2, 1));

        guard.release();
        assert_eq!(wake.counts(), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_to_zero_cancels_watchdog() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), Duration::from_secs(60));

        guard.acquire();
        guard.release();
        assert_eq!(wake.counts(), (1, 1));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(wake.counts(), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_acquire_extends_window() {
        let wake = Arc::new(CountingWake::default());
        let guard = ResourceGuard::new(wake.clone(), Duration::from_secs(60));

        guard.acquire();
        tokio::time::sleep(Duration::from_secs(40)).await;

        // Rearms the watchdog; 80s after the first acquire the guard is
        // still inside the second window.
        guard.acquire();
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(guard.held());
        assert_eq!(guard.refcount(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!guard.held());
        assert_eq!(wake.counts(), (1, 1));
    }
}
