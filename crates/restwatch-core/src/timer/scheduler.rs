//! Work/break cycle scheduler.
//!
//! The scheduler is the finite-state machine governing the work/break
//! cadence. It owns the work-duration wake-up; the break overlay owns the
//! break countdown and reports completion back, so no two clocks ever race
//! to declare a break over.
//!
//! All mutable state sits behind a single mutex held only for the duration
//! of a transition or query. Events go out on a broadcast channel after the
//! lock is released; a slow subscriber can never stall a transition.
//!
//! Triggers received in an illegal source state are silent no-ops. That is
//! the only cancellation story asynchronous collaborators get: a stale
//! idle-active signal after a manual pause, a duplicate completion from the
//! overlay, or a late wake-up fire all fall through harmlessly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use super::{BreakLedger, TimerSettings, TimerState};
use crate::events::Event;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Point-in-time view of the scheduler for a status surface polling at
/// ~1 second resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub state: TimerState,
    /// Remaining work time in seconds; zero outside `Running`.
    pub seconds_until_break: u64,
    /// Remaining break time in seconds; zero outside `BreakRequired`.
    pub break_seconds_remaining: u64,
}

struct Inner {
    state: TimerState,
    settings: TimerSettings,
    /// Instant the current running interval began. Only while `Running`.
    work_started_at: Option<Instant>,
    /// Work time banked across prior running intervals since the last break.
    accumulated: Duration,
    /// Instant the current break began. Only while `BreakRequired`.
    break_started_at: Option<Instant>,
    /// Ledger row id of the in-flight break entry, 0 when none is open.
    current_break_id: i64,
    /// Bumped on every arm/cancel; a wake-up fire carrying a stale
    /// generation is a no-op even if the abort raced it.
    wakeup_generation: u64,
    wakeup: Option<JoinHandle<()>>,
}

/// The work/break cycle state machine.
///
/// Created once per process, starting in `PausedManual` -- never
/// auto-running. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    ledger: Arc<dyn BreakLedger>,
    events: broadcast::Sender<Event>,
}

impl Scheduler {
    pub fn new(settings: TimerSettings, ledger: Arc<dyn BreakLedger>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: TimerState::PausedManual,
                settings,
                work_started_at: None,
                accumulated: Duration::ZERO,
                break_started_at: None,
                current_break_id: 0,
                wakeup_generation: 0,
                wakeup: None,
            })),
            ledger,
            events,
        }
    }

    /// Subscribe to scheduler events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.lock().state
    }

    /// Remaining time until the next break. Zero outside `Running`;
    /// clamped at zero once the work budget is spent.
    pub fn time_until_break(&self) -> Duration {
        let inner = self.lock();
        if inner.state != TimerState::Running {
            return Duration::ZERO;
        }
        let running = inner
            .work_started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        inner
            .settings
            .work_duration
            .saturating_sub(inner.accumulated + running)
    }

    /// Remaining time in the current break. Zero outside `BreakRequired`.
    pub fn break_time_remaining(&self) -> Duration {
        let inner = self.lock();
        if inner.state != TimerState::BreakRequired {
            return Duration::ZERO;
        }
        let elapsed = inner
            .break_started_at
            .map(|t| t.elapsed())
            .unwrap_or_default();
        inner.settings.break_duration.saturating_sub(elapsed)
    }

    /// Full state snapshot, computed fresh from the clock.
    pub fn status(&self) -> Status {
        let inner = self.lock();
        let mut seconds_until_break = 0;
        let mut break_seconds_remaining = 0;
        match inner.state {
            TimerState::Running => {
                let running = inner
                    .work_started_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                seconds_until_break = inner
                    .settings
                    .work_duration
                    .saturating_sub(inner.accumulated + running)
                    .as_secs();
            }
            TimerState::BreakRequired => {
                let elapsed = inner
                    .break_started_at
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                break_seconds_remaining = inner
                    .settings
                    .break_duration
                    .saturating_sub(elapsed)
                    .as_secs();
            }
            _ => {}
        }
        Status {
            state: inner.state,
            seconds_until_break,
            break_seconds_remaining,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a fresh work interval. No-op unless paused.
    pub fn start(&self) {
        let events = {
            let mut inner = self.lock();
            if !matches!(
                inner.state,
                TimerState::PausedManual | TimerState::PausedInactive
            ) {
                return;
            }
            inner.state = TimerState::Running;
            inner.accumulated = Duration::ZERO;
            inner.work_started_at = Some(Instant::now());
            let mut events = vec![state_changed(TimerState::Running)];
            events.extend(self.arm_or_trigger(&mut inner));
            events
        };
        self.emit(events);
    }

    /// Manual pause. No-op unless `Running`.
    pub fn pause(&self) {
        self.pause_to(TimerState::PausedManual);
    }

    /// Inactivity pause, driven by the idle signal. No-op unless `Running`.
    pub fn pause_inactive(&self) {
        self.pause_to(TimerState::PausedInactive);
    }

    fn pause_to(&self, target: TimerState) {
        let events = {
            let mut inner = self.lock();
            if inner.state != TimerState::Running {
                return;
            }
            self.cancel_wakeup(&mut inner);
            if let Some(started) = inner.work_started_at.take() {
                inner.accumulated += started.elapsed();
            }
            inner.state = target;
            vec![state_changed(target)]
        };
        self.emit(events);
    }

    /// Resume from either pause, preserving banked work time.
    pub fn resume(&self) {
        self.resume_if(|state| {
            matches!(
                state,
                TimerState::PausedManual | TimerState::PausedInactive
            )
        });
    }

    /// Resume driven by the idle signal. No-op unless `PausedInactive`, so a
    /// stale became-active event can never undo a manual pause.
    pub fn resume_from_inactive(&self) {
        self.resume_if(|state| state == TimerState::PausedInactive);
    }

    fn resume_if(&self, legal: impl Fn(TimerState) -> bool) {
        let events = {
            let mut inner = self.lock();
            if !legal(inner.state) {
                return;
            }
            inner.state = TimerState::Running;
            inner.work_started_at = Some(Instant::now());
            let mut events = vec![state_changed(TimerState::Running)];
            events.extend(self.arm_or_trigger(&mut inner));
            events
        };
        self.emit(events);
    }

    /// Mark the current break as completed. Driven by the break display's
    /// countdown. No-op unless `BreakRequired`.
    pub fn complete_break(&self) {
        let events = {
            let mut inner = self.lock();
            if inner.state != TimerState::BreakRequired {
                return;
            }
            let duration = inner
                .break_started_at
                .take()
                .map(|t| t.elapsed())
                .unwrap_or_default();
            let break_id = inner.current_break_id;
            if break_id > 0 {
                if let Err(e) = self.ledger.record_break_complete(break_id, duration) {
                    warn!(break_id, error = %e, "failed to record break completion");
                }
            }
            inner.current_break_id = 0;
            let mut events = self.restart_work(&mut inner);
            events.push(Event::BreakCompleted {
                break_id,
                duration_secs: duration.as_secs(),
                at: Utc::now(),
            });
            events
        };
        self.emit(events);
    }

    /// Skip the current break. No-op unless `BreakRequired`.
    pub fn skip_break(&self) {
        let events = {
            let mut inner = self.lock();
            if inner.state != TimerState::BreakRequired {
                return;
            }
            inner.break_started_at = None;
            let break_id = inner.current_break_id;
            if break_id > 0 {
                if let Err(e) = self.ledger.record_break_skipped(break_id) {
                    warn!(break_id, error = %e, "failed to record skipped break");
                }
            }
            inner.current_break_id = 0;
            let mut events = self.restart_work(&mut inner);
            events.push(Event::BreakSkipped {
                break_id,
                at: Utc::now(),
            });
            events
        };
        self.emit(events);
    }

    /// Stop the cycle entirely: cancel the wake-up, zero the accounting and
    /// land in `PausedManual`. Legal from any state.
    pub fn stop(&self) {
        let events = {
            let mut inner = self.lock();
            self.cancel_wakeup(&mut inner);
            inner.state = TimerState::PausedManual;
            inner.accumulated = Duration::ZERO;
            inner.work_started_at = None;
            inner.break_started_at = None;
            vec![state_changed(TimerState::PausedManual)]
        };
        self.emit(events);
    }

    /// Swap in new settings. Applied atomically between transitions; the
    /// next scheduling decision uses them, an armed wake-up keeps its
    /// deadline.
    pub fn update_settings(&self, settings: TimerSettings) {
        let mut inner = self.lock();
        inner.settings = settings;
        debug!(
            work_secs = settings.work_duration.as_secs(),
            break_secs = settings.break_duration.as_secs(),
            "scheduler settings updated"
        );
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset accounting after a break outcome and re-enter `Running`.
    fn restart_work(&self, inner: &mut Inner) -> Vec<Event> {
        inner.state = TimerState::Running;
        inner.accumulated = Duration::ZERO;
        inner.work_started_at = Some(Instant::now());
        let mut events = vec![state_changed(TimerState::Running)];
        events.extend(self.arm_or_trigger(inner));
        events
    }

    /// Arm the work-duration wake-up for the remaining budget, or trigger
    /// the break right away when the budget is already spent.
    fn arm_or_trigger(&self, inner: &mut Inner) -> Vec<Event> {
        let remaining = inner
            .settings
            .work_duration
            .saturating_sub(inner.accumulated);
        if remaining.is_zero() {
            return self.begin_break(inner);
        }

        inner.wakeup_generation += 1;
        let generation = inner.wakeup_generation;
        if let Some(handle) = inner.wakeup.take() {
            handle.abort();
        }
        let deadline = Instant::now() + remaining;
        let scheduler = self.clone();
        inner.wakeup = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            scheduler.on_wakeup(generation);
        }));
        Vec::new()
    }

    fn cancel_wakeup(&self, inner: &mut Inner) {
        inner.wakeup_generation += 1;
        if let Some(handle) = inner.wakeup.take() {
            handle.abort();
        }
    }

    /// Work-duration wake-up fired. A stale fire -- after a cancel, or after
    /// a newer arm replaced this one -- observes a generation or state
    /// mismatch and is a no-op.
    fn on_wakeup(&self, generation: u64) {
        let events = {
            let mut inner = self.lock();
            if inner.state != TimerState::Running || inner.wakeup_generation != generation {
                return;
            }
            self.begin_break(&mut inner)
        };
        self.emit(events);
    }

    /// Transition into `BreakRequired` and open the ledger entry.
    ///
    /// The scheduler arms no break-expiry timer here; the break display owns
    /// the countdown and reports back via `complete_break`.
    fn begin_break(&self, inner: &mut Inner) -> Vec<Event> {
        match self.ledger.record_break_start() {
            Ok(id) => inner.current_break_id = id,
            Err(e) => {
                warn!(error = %e, "failed to record break start");
                inner.current_break_id = 0;
            }
        }
        inner.state = TimerState::BreakRequired;
        inner.work_started_at = None;
        inner.break_started_at = Some(Instant::now());
        vec![
            state_changed(TimerState::BreakRequired),
            Event::BreakRequired {
                break_id: inner.current_break_id,
                break_duration_secs: inner.settings.break_duration.as_secs(),
                at: Utc::now(),
            },
        ]
    }

    fn emit(&self, events: Vec<Event>) {
        for event in events {
            debug!(?event, "scheduler event");
            // Send only fails when nobody is subscribed.
            let _ = self.events.send(event);
        }
    }
}

fn state_changed(state: TimerState) -> Event {
    Event::StateChanged {
        state,
        at: Utc::now(),
    }
}
