// SPDX-License-Identifier: MIT

//! Logging setup for the daemon binary.
//!
//! Writes structured `tracing` events to the process's own stdout through a
//! non-blocking writer, so that whatever `-1 FILE` redirected fd 1 to (or the
//! inherited terminal, if none was given) receives them — no separate log
//! file path is configured independently of the CLI's own redirection
//! flags.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global `tracing` subscriber. Returns a guard that must be
/// kept alive for the duration of the process — dropping it stops the
/// non-blocking writer from flushing.
pub fn init() -> tracing_appender::non_blocking::WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    guard
}
