//! Break display countdown.
//!
//! [`BreakOverlay`] owns the authoritative break countdown: the scheduler
//! transitions into its break state and then waits for this component to
//! report completion, so there is never a second clock racing to declare
//! the break over. Rendering goes through [`OverlaySurface`]; the actual
//! drawing (full-screen windows, a terminal line) lives outside the core.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Rendering backend for the break countdown.
pub trait OverlaySurface: Send + Sync {
    /// Raise the surface with the configured background opacity.
    fn show(&self, opacity: f64);
    /// Refresh the displayed remaining seconds.
    fn update(&self, remaining_secs: u64);
    /// Tear the surface down.
    fn hide(&self);
}

const DONE_CHANNEL_CAPACITY: usize = 4;

struct OverlayInner {
    showing: bool,
    /// Bumped per show; a countdown finishing against a stale generation
    /// must not report completion.
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
}

/// Full-screen break countdown driver.
///
/// `show` starts a 1 Hz countdown that fires the completion signal exactly
/// once when it reaches zero -- or never, if `hide` tears it down first.
#[derive(Clone)]
pub struct BreakOverlay {
    surface: Arc<dyn OverlaySurface>,
    opacity: f64,
    inner: Arc<Mutex<OverlayInner>>,
    done: mpsc::Sender<()>,
}

impl BreakOverlay {
    /// Create an overlay and the receiving end of its completion signal.
    pub fn new(surface: Arc<dyn OverlaySurface>, opacity: f64) -> (Self, mpsc::Receiver<()>) {
        let (done, rx) = mpsc::channel(DONE_CHANNEL_CAPACITY);
        (
            Self {
                surface,
                opacity,
                inner: Arc::new(Mutex::new(OverlayInner {
                    showing: false,
                    generation: 0,
                    cancel: None,
                })),
                done,
            },
            rx,
        )
    }

    pub fn is_showing(&self) -> bool {
        self.lock().showing
    }

    /// Raise the surface and start counting down `duration`.
    /// No-op while already showing.
    pub fn show(&self, duration: Duration) {
        let (generation, mut cancel_rx) = {
            let mut inner = self.lock();
            if inner.showing {
                return;
            }
            inner.showing = true;
            inner.generation += 1;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            inner.cancel = Some(cancel_tx);
            (inner.generation, cancel_rx)
        };

        self.surface.show(self.opacity);
        debug!(secs = duration.as_secs(), "break overlay raised");

        let overlay = self.clone();
        tokio::spawn(async move {
            let mut remaining = duration.as_secs();
            overlay.surface.update(remaining);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; the countdown starts on
            // the next one.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        remaining = remaining.saturating_sub(1);
                        overlay.surface.update(remaining);
                        if remaining == 0 {
                            overlay.finish(generation).await;
                            return;
                        }
                    }
                    _ = cancel_rx.changed() => {
                        return;
                    }
                }
            }
        });
    }

    /// Tear the surface down early. The completion signal never fires for a
    /// countdown hidden this way. No-op while not showing.
    pub fn hide(&self) {
        {
            let mut inner = self.lock();
            if !inner.showing {
                return;
            }
            inner.showing = false;
            if let Some(cancel) = inner.cancel.take() {
                let _ = cancel.send(true);
            }
        }
        self.surface.hide();
        debug!("break overlay hidden");
    }

    /// Countdown reached zero: tear down and report completion once.
    async fn finish(&self, generation: u64) {
        {
            let mut inner = self.lock();
            if !inner.showing || inner.generation != generation {
                // A concurrent hide/show got here first.
                return;
            }
            inner.showing = false;
            inner.cancel = None;
        }
        self.surface.hide();
        debug!("break overlay countdown complete");
        let _ = self.done.send(()).await;
    }

    fn lock(&self) -> MutexGuard<'_, OverlayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingSurface {
        shows: AtomicUsize,
        hides: AtomicUsize,
        updates: Mutex<Vec<u64>>,
    }

    impl OverlaySurface for RecordingSurface {
        fn show(&self, _opacity: f64) {
            self.shows.fetch_add(1, Ordering::SeqCst);
        }

        fn update(&self, remaining_secs: u64) {
            self.updates.lock().unwrap().push(remaining_secs);
        }

        fn hide(&self) {
            self.hides.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_completes_exactly_once() {
        let surface = Arc::new(RecordingSurface::default());
        let (overlay, mut done) = BreakOverlay::new(surface.clone(), 0.95);

        overlay.show(Duration::from_secs(3));
        assert!(overlay.is_showing());

        assert_eq!(done.recv().await, Some(()));
        assert!(!overlay.is_showing());
        assert_eq!(surface.shows.load(Ordering::SeqCst), 1);
        assert_eq!(surface.hides.load(Ordering::SeqCst), 1);
        assert_eq!(*surface.updates.lock().unwrap(), vec![3, 2, 1, 0]);

        // Nothing fires afterwards.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(done.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn hide_before_zero_suppresses_completion() {
        let surface = Arc::new(RecordingSurface::default());
        let (overlay, mut done) = BreakOverlay::new(surface.clone(), 0.95);

        overlay.show(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        overlay.hide();
        assert!(!overlay.is_showing());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(done.try_recv().is_err());
        assert_eq!(surface.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_show_is_ignored_while_visible() {
        let surface = Arc::new(RecordingSurface::default());
        let (overlay, mut done) = BreakOverlay::new(surface.clone(), 0.95);

        overlay.show(Duration::from_secs(2));
        overlay.show(Duration::from_secs(60));
        assert_eq!(surface.shows.load(Ordering::SeqCst), 1);

        // The original 2-second countdown still completes.
        assert_eq!(done.recv().await, Some(()));
        assert_eq!(surface.hides.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hide_while_not_showing_is_noop() {
        let surface = Arc::new(RecordingSurface::default());
        let (overlay, _done) = BreakOverlay::new(surface.clone(), 0.95);

        overlay.hide();
        assert_eq!(surface.hides.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn show_after_hide_runs_a_fresh_countdown() {
        let surface = Arc::new(RecordingSurface::default());
        let (overlay, mut done) = BreakOverlay::new(surface.clone(), 0.95);

        overlay.show(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        overlay.hide();

        overlay.show(Duration::from_secs(2));
        assert_eq!(done.recv().await, Some(()));
        assert_eq!(surface.shows.load(Ordering::SeqCst), 2);
        assert_eq!(surface.hides.load(Ordering::SeqCst), 2);
    }
}
