//! The break daemon: wires the scheduler, idle monitor and overlay
//! together and runs until told to stop.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use restwatch_core::{
    ActivityEvent, ActivityMonitor, BreakLedger, BreakOverlay, Config, Event, IdleProbe, Ledger,
    OverlaySurface, Scheduler, Status, TimerState,
};
use signal_hook::consts::{SIGUSR1, SIGUSR2};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::signals;

/// Placeholder probe for platforms without an idle-time backend wired in.
/// Reporting zero idle time keeps the monitor quiet and the timer running.
struct AlwaysActiveProbe;

impl IdleProbe for AlwaysActiveProbe {
    fn idle_time(&self) -> io::Result<Duration> {
        Ok(Duration::ZERO)
    }
}

/// Renders the break countdown as a terminal line.
struct TerminalSurface {
    bell: bool,
}

impl OverlaySurface for TerminalSurface {
    fn show(&self, opacity: f64) {
        if self.bell {
            print!("\x07");
        }
        println!();
        info!(opacity, "break overlay up");
    }

    fn update(&self, remaining_secs: u64) {
        print!("\rlook away from the screen -- {remaining_secs:>3}s remaining ");
        let _ = io::stdout().flush();
    }

    fn hide(&self) {
        println!();
    }
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("restwatch_cli=info,restwatch_core=info")),
        )
        .init();

    let config = Config::load()?;
    info!(
        work_minutes = config.timer.work_minutes,
        break_seconds = config.timer.break_seconds,
        idle_threshold_minutes = config.idle.threshold_minutes,
        "starting restwatch daemon"
    );

    let ledger = Arc::new(Ledger::open()?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(daemon(config, ledger))
}

async fn daemon(mut config: Config, ledger: Arc<Ledger>) -> Result<(), Box<dyn std::error::Error>> {
    let ledger_port: Arc<dyn BreakLedger> = ledger.clone();
    let scheduler = Scheduler::new(config.timer_settings(), ledger_port);

    let surface = Arc::new(TerminalSurface {
        bell: config.overlay.bell,
    });
    let (overlay, mut overlay_done) = BreakOverlay::new(surface, config.overlay.opacity);

    let probe = Arc::new(AlwaysActiveProbe);
    let (monitor, mut activity_rx) =
        ActivityMonitor::new(probe, config.idle_threshold(), config.poll_interval());

    let session_id = match ledger.start_session() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "failed to start session");
            None
        }
    };

    if config.first_run {
        info!("first run detected, welcome to restwatch");
        config.first_run = false;
        if let Err(e) = config.save() {
            warn!(error = %e, "failed to clear first_run flag");
        }
    }

    // Scheduler events drive the overlay and the log.
    let mut events_rx = scheduler.subscribe();
    let overlay_events = overlay.clone();
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(Event::BreakRequired {
                    break_duration_secs,
                    ..
                }) => {
                    info!(secs = break_duration_secs, "break required");
                    overlay_events.show(Duration::from_secs(break_duration_secs));
                }
                Ok(Event::BreakCompleted { duration_secs, .. }) => {
                    info!(secs = duration_secs, "break completed");
                    overlay_events.hide();
                }
                Ok(Event::BreakSkipped { .. }) => {
                    info!("break skipped");
                    overlay_events.hide();
                }
                Ok(Event::StateChanged { state, .. }) => {
                    info!(%state, "timer state changed");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    // Overlay countdown completion closes the break.
    let overlay_sched = scheduler.clone();
    tokio::spawn(async move {
        while overlay_done.recv().await.is_some() {
            overlay_sched.complete_break();
        }
    });

    // Idle edges pause and resume the work timer.
    let idle_sched = scheduler.clone();
    tokio::spawn(async move {
        while let Some(event) = activity_rx.recv().await {
            match event {
                ActivityEvent::BecameIdle => {
                    info!("user became idle, pausing timer");
                    idle_sched.pause_inactive();
                }
                ActivityEvent::BecameActive => {
                    info!("user became active, resuming timer");
                    idle_sched.resume_from_inactive();
                }
            }
        }
    });

    monitor.start();
    scheduler.start();

    let mut signal_stream = signals::listen()?;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print!("\r{} ", format_status(&scheduler.status()));
                let _ = io::stdout().flush();
            }
            signal = signal_stream.next() => match signal {
                Some(SIGUSR1) => {
                    info!("skip requested");
                    scheduler.skip_break();
                }
                Some(SIGUSR2) => toggle_pause(&scheduler),
                Some(_) | None => break,
            }
        }
    }
    println!();

    info!("shutting down");
    monitor.stop();
    scheduler.stop();
    if let Some(id) = session_id {
        // Paused stretches are not totalled across the session; reported as
        // zero.
        if let Err(e) = ledger.end_session(id, Duration::ZERO) {
            warn!(error = %e, "failed to end session");
        }
    }

    Ok(())
}

fn toggle_pause(scheduler: &Scheduler) {
    match scheduler.state() {
        TimerState::Running => {
            info!("pause requested");
            scheduler.pause();
        }
        TimerState::PausedManual | TimerState::PausedInactive => {
            info!("resume requested");
            scheduler.resume();
        }
        TimerState::BreakRequired => {}
    }
}

fn format_status(status: &Status) -> String {
    match status.state {
        TimerState::Running => {
            let minutes = status.seconds_until_break / 60;
            let seconds = status.seconds_until_break % 60;
            format!("{minutes:02}:{seconds:02} until break")
        }
        TimerState::BreakRequired => {
            format!("break: {}s", status.break_seconds_remaining)
        }
        TimerState::PausedManual => "paused".to_string(),
        TimerState::PausedInactive => "paused (idle)".to_string(),
    }
}
