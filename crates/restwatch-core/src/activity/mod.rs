//! User-activity monitoring.
//!
//! Polls an [`IdleProbe`] on a fixed interval and emits edge-triggered
//! events when measured idle time crosses the configured threshold. The
//! scheduler consumes the events as independent pause/resume triggers; it
//! never polls idle state itself.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// OS-level idle-time query, behind a seam so platform backends and test
/// probes are interchangeable.
pub trait IdleProbe: Send + Sync {
    /// Time since the last user input event.
    fn idle_time(&self) -> io::Result<Duration>;
}

/// Edge-triggered activity transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// Measured idle time crossed the threshold from below.
    BecameIdle,
    /// Measured idle time dropped back below the threshold.
    BecameActive,
}

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Polls the idle probe and reports threshold crossings.
///
/// A probe failure is treated as "active": a measurement failure must never
/// silently freeze the timer in a paused state.
pub struct ActivityMonitor {
    probe: Arc<dyn IdleProbe>,
    poll_interval: Duration,
    threshold: Arc<Mutex<Duration>>,
    is_idle: Arc<AtomicBool>,
    events: mpsc::Sender<ActivityEvent>,
    stop: watch::Sender<bool>,
}

impl ActivityMonitor {
    /// Create a monitor and the receiving end of its event stream.
    pub fn new(
        probe: Arc<dyn IdleProbe>,
        threshold: Duration,
        poll_interval: Duration,
    ) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stop, _) = watch::channel(false);
        (
            Self {
                probe,
                poll_interval,
                threshold: Arc::new(Mutex::new(threshold)),
                is_idle: Arc::new(AtomicBool::new(false)),
                events,
                stop,
            },
            rx,
        )
    }

    /// Begin polling. Subsequent calls while running are no-ops.
    pub fn start(&self) {
        if *self.stop.borrow() {
            // stop() already happened; the monitor is done for good.
            return;
        }
        if self.stop.receiver_count() > 0 {
            return;
        }

        let probe = Arc::clone(&self.probe);
        let threshold = Arc::clone(&self.threshold);
        let is_idle = Arc::clone(&self.is_idle);
        let events = self.events.clone();
        let mut stop_rx = self.stop.subscribe();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        check_idle(&*probe, &threshold, &is_idle, &events).await;
                    }
                    _ = stop_rx.changed() => {
                        debug!("activity monitor stopped");
                        return;
                    }
                }
            }
        });
    }

    /// Stop polling. The monitor cannot be restarted afterwards.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Whether the user is currently considered idle.
    pub fn is_idle(&self) -> bool {
        self.is_idle.load(Ordering::SeqCst)
    }

    /// Swap in a new idle threshold; takes effect on the next poll.
    pub fn set_threshold(&self, threshold: Duration) {
        *self
            .threshold
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = threshold;
    }
}

async fn check_idle(
    probe: &dyn IdleProbe,
    threshold: &Mutex<Duration>,
    is_idle: &AtomicBool,
    events: &mpsc::Sender<ActivityEvent>,
) {
    let idle_for = match probe.idle_time() {
        Ok(d) => d,
        Err(e) => {
            // Conservative: a failed measurement reads as activity.
            warn!(error = %e, "idle probe failed, assuming active");
            Duration::ZERO
        }
    };

    let threshold = *threshold.lock().unwrap_or_else(PoisonError::into_inner);
    let was_idle = is_idle.load(Ordering::SeqCst);

    if idle_for >= threshold && !was_idle {
        is_idle.store(true, Ordering::SeqCst);
        debug!(idle_secs = idle_for.as_secs(), "user became idle");
        let _ = events.send(ActivityEvent::BecameIdle).await;
    } else if idle_for < threshold && was_idle {
        is_idle.store(false, Ordering::SeqCst);
        debug!("user became active");
        let _ = events.send(ActivityEvent::BecameActive).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Probe that replays a scripted sequence of readings, repeating the
    /// last one forever.
    struct ScriptedProbe {
        readings: Mutex<VecDeque<io::Result<Duration>>>,
        last: Mutex<Duration>,
    }

    impl ScriptedProbe {
        fn new(readings: Vec<io::Result<Duration>>) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.into()),
                last: Mutex::new(Duration::ZERO),
            })
        }
    }

    impl IdleProbe for ScriptedProbe {
        fn idle_time(&self) -> io::Result<Duration> {
            match self.readings.lock().unwrap().pop_front() {
                Some(Ok(d)) => {
                    *self.last.lock().unwrap() = d;
                    Ok(d)
                }
                Some(Err(e)) => Err(e),
                None => Ok(*self.last.lock().unwrap()),
            }
        }
    }

    const THRESHOLD: Duration = Duration::from_secs(300);
    const POLL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn became_idle_fires_once_per_crossing() {
        let probe = ScriptedProbe::new(vec![
            Ok(Duration::ZERO),
            Ok(Duration::from_secs(310)),
            Ok(Duration::from_secs(320)),
            Ok(Duration::from_secs(330)),
        ]);
        let (monitor, mut rx) = ActivityMonitor::new(probe, THRESHOLD, POLL);
        monitor.start();

        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameIdle));
        assert!(monitor.is_idle());

        // Further above-threshold polls must not re-fire.
        tokio::time::sleep(POLL * 3).await;
        assert!(rx.try_recv().is_err());

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn became_active_fires_when_dropping_below_threshold() {
        let probe = ScriptedProbe::new(vec![
            Ok(Duration::from_secs(400)),
            Ok(Duration::from_secs(410)),
            Ok(Duration::from_secs(2)),
        ]);
        let (monitor, mut rx) = ActivityMonitor::new(probe, THRESHOLD, POLL);
        monitor.start();

        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameIdle));
        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameActive));
        assert!(!monitor.is_idle());

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_reads_as_active() {
        let probe = ScriptedProbe::new(vec![
            Ok(Duration::from_secs(400)),
            Err(io::Error::other("probe broke")),
        ]);
        let (monitor, mut rx) = ActivityMonitor::new(probe, THRESHOLD, POLL);
        monitor.start();

        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameIdle));
        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameActive));

        monitor.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_polling() {
        let probe = ScriptedProbe::new(vec![Ok(Duration::ZERO)]);
        let (monitor, mut rx) = ActivityMonitor::new(probe, THRESHOLD, POLL);
        monitor.start();
        monitor.stop();
        drop(monitor);

        // Channel closes once the poll task and the monitor drop their
        // senders.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_update_applies_on_next_poll() {
        let probe = ScriptedProbe::new(vec![Ok(Duration::from_secs(120))]);
        let (monitor, mut rx) = ActivityMonitor::new(probe, THRESHOLD, POLL);
        monitor.start();

        tokio::time::sleep(POLL * 2).await;
        assert!(rx.try_recv().is_err());

        monitor.set_threshold(Duration::from_secs(60));
        assert_eq!(rx.recv().await, Some(ActivityEvent::BecameIdle));

        monitor.stop();
    }
}
