mod config;
pub mod ledger;
pub mod migrations;

pub use config::{Config, IdleConfig, OverlayConfig, TimerConfig};
pub use ledger::{Break, ComplianceReport, DailyStats, Ledger, Period};

use std::path::PathBuf;

/// Returns `~/.config/restwatch[-dev]/` based on RESTWATCH_ENV.
///
/// Set RESTWATCH_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> std::io::Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("RESTWATCH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("restwatch-dev")
    } else {
        base_dir.join("restwatch")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
