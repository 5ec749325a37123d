mod scheduler;

pub use scheduler::{Scheduler, Status};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Current state of the work/break cycle.
///
/// Exactly one state is active at any instant; it is the sole source of
/// truth for which transitions and queries are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// The work timer is actively counting down.
    Running,
    /// The work budget expired; a break is in progress.
    BreakRequired,
    /// The user manually paused the timer.
    PausedManual,
    /// The timer auto-paused due to user inactivity.
    PausedInactive,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerState::Running => "Running",
            TimerState::BreakRequired => "Break Required",
            TimerState::PausedManual => "Paused",
            TimerState::PausedInactive => "Paused (Idle)",
        };
        f.write_str(s)
    }
}

/// The slice of configuration the scheduler consumes.
///
/// Updates are applied atomically between transitions and affect the next
/// scheduling decision only; an already-armed wake-up keeps its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSettings {
    pub work_duration: Duration,
    pub break_duration: Duration,
}

/// Sink for break records, consumed by the scheduler.
///
/// Write failures never block a transition; the scheduler logs them and
/// carries on, so scheduling correctness does not depend on storage
/// availability.
pub trait BreakLedger: Send + Sync {
    /// Open a new break entry. Returns its id.
    fn record_break_start(&self) -> Result<i64, LedgerError>;

    /// Close a break entry as completed with its measured duration.
    fn record_break_complete(&self, break_id: i64, duration: Duration) -> Result<(), LedgerError>;

    /// Close a break entry as skipped.
    fn record_break_skipped(&self, break_id: i64) -> Result<(), LedgerError>;
}
