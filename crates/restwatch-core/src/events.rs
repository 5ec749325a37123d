use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerState;

/// Every scheduler state change produces an Event.
///
/// Events are published on a broadcast channel after the scheduler lock is
/// released; presentation code consumes them on its own task and can never
/// stall a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    StateChanged {
        state: TimerState,
        at: DateTime<Utc>,
    },
    /// The work budget expired; a break must start now.
    BreakRequired {
        /// Ledger row id of the break entry, 0 if the write failed.
        break_id: i64,
        break_duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// The break display finished its countdown.
    BreakCompleted {
        break_id: i64,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    BreakSkipped {
        break_id: i64,
        at: DateTime<Utc>,
    },
}
