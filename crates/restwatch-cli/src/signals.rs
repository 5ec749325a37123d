//! Signal handling for the daemon loop.

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook_tokio::Signals;

/// Signal stream for the daemon: SIGINT/SIGTERM shut it down, SIGUSR1
/// skips the current break, SIGUSR2 toggles manual pause.
pub fn listen() -> std::io::Result<Signals> {
    Signals::new([SIGTERM, SIGINT, SIGUSR1, SIGUSR2])
}
