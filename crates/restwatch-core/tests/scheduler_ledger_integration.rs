//! Integration tests for the scheduler driving the real SQLite ledger.
//!
//! Exercises the full workflow: work expiry opens a break row, completion
//! and skip close it, and the compliance aggregates reflect the outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use restwatch_core::{Ledger, Period, Scheduler, TimerSettings, TimerState};

const WORK: Duration = Duration::from_secs(1200);
const BREAK: Duration = Duration::from_secs(20);

fn scheduler_with_ledger() -> (Scheduler, Arc<Ledger>) {
    let ledger = Arc::new(Ledger::open_memory().unwrap());
    let settings = TimerSettings {
        work_duration: WORK,
        break_duration: BREAK,
    };
    (Scheduler::new(settings, ledger.clone()), ledger)
}

#[tokio::test(start_paused = true)]
async fn work_expiry_opens_a_ledger_break_entry() {
    let (sched, ledger) = scheduler_with_ledger();

    sched.start();
    tokio::time::sleep(WORK + Duration::from_secs(1)).await;

    assert_eq!(sched.state(), TimerState::BreakRequired);
    let breaks = ledger.breaks_for_date(Utc::now().date_naive()).unwrap();
    assert_eq!(breaks.len(), 1);
    assert!(!breaks[0].was_completed);
    assert!(!breaks[0].was_skipped);
    assert!(breaks[0].completed_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn completed_break_is_closed_with_measured_duration() {
    let (sched, ledger) = scheduler_with_ledger();

    sched.start();
    tokio::time::sleep(WORK + Duration::from_secs(1)).await;
    tokio::time::sleep(BREAK - Duration::from_secs(1)).await;
    sched.complete_break();

    assert_eq!(sched.state(), TimerState::Running);
    assert_eq!(sched.time_until_break(), WORK);

    let breaks = ledger.breaks_for_date(Utc::now().date_naive()).unwrap();
    assert_eq!(breaks.len(), 1);
    assert!(breaks[0].was_completed);
    assert!(breaks[0].completed_at.is_some());
    assert_eq!(breaks[0].duration_seconds, BREAK.as_secs() as u32);

    let report = ledger.compliance_report(Period::Today).unwrap();
    assert_eq!(report.total_breaks, 1);
    assert_eq!(report.completed_breaks, 1);
    assert_eq!(report.compliance_rate, 100.0);
}

#[tokio::test(start_paused = true)]
async fn skipped_break_drags_compliance_down() {
    let (sched, ledger) = scheduler_with_ledger();

    sched.start();
    tokio::time::sleep(WORK + Duration::from_secs(1)).await;
    sched.complete_break();

    tokio::time::sleep(WORK + Duration::from_secs(1)).await;
    sched.skip_break();

    let report = ledger.compliance_report(Period::Today).unwrap();
    assert_eq!(report.total_breaks, 2);
    assert_eq!(report.completed_breaks, 1);
    assert_eq!(report.skipped_breaks, 1);
    assert_eq!(report.compliance_rate, 50.0);

    let stats = ledger.daily_stats(Utc::now().date_naive()).unwrap();
    assert_eq!(stats.breaks_required, 2);
    assert_eq!(stats.breaks_completed, 1);
    assert_eq!(stats.breaks_skipped, 1);
}

#[tokio::test(start_paused = true)]
async fn ledger_session_wraps_a_scheduler_run() {
    let (sched, ledger) = scheduler_with_ledger();

    let session_id = ledger.start_session().unwrap();
    sched.start();
    tokio::time::sleep(Duration::from_secs(90)).await;
    sched.stop();
    ledger.end_session(session_id, Duration::ZERO).unwrap();

    assert_eq!(sched.state(), TimerState::PausedManual);
}
