//! Structured logging for taskweave.
//!
//! Log levels:
//! - ERROR: Failures that abort a run (cycles, unreadable templates)
//! - WARN: Recoverable per-task problems (missing worker, worker error)
//! - INFO: High-level run notifications (plan chosen, run finished)
//! - DEBUG: Dispatch traces (layers, placeholder resolution)
//! - TRACE: Very detailed traces (CRDT merges, evidence writes)
//!
//! Debug mode can be enabled with `--debug` flag or `TASKWEAVE_DEBUG=1` env var.
//! Events are emitted through `tracing`; `init_with_debug` installs a
//! subscriber writing to `~/.taskweave/taskweave.log`.

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Initialize logging to ~/.taskweave/taskweave.log with an explicit debug
/// mode setting.
///
/// `RUST_LOG` takes precedence over the level derived from the debug flag.
/// Calling this more than once is harmless; only the first subscriber sticks.
pub fn init_with_debug(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug || env_debug())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false);

    // Truncate file on startup, fall back to stderr without a home directory.
    let log_file = dirs::home_dir()
        .map(|h| h.join(".taskweave"))
        .and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            File::create(dir.join("taskweave.log")).ok()
        });

    let _ = match log_file {
        Some(file) => builder.with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}

/// `EnvFilter` directive used when `RUST_LOG` is unset.
fn default_directive(debug: bool) -> &'static str {
    if debug {
        "taskweave=debug"
    } else {
        "taskweave=info"
    }
}

fn env_debug() -> bool {
    std::env::var("TASKWEAVE_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Log macro for INFO level.
#[macro_export]
macro_rules! twlog {
    ($($arg:tt)*) => {
        ::tracing::info!($($arg)*)
    };
}

/// Log macro for ERROR level.
#[macro_export]
macro_rules! twlog_error {
    ($($arg:tt)*) => {
        ::tracing::error!($($arg)*)
    };
}

/// Log macro for WARN level.
#[macro_export]
macro_rules! twlog_warn {
    ($($arg:tt)*) => {
        ::tracing::warn!($($arg)*)
    };
}

/// Log macro for DEBUG level (only logs when debug mode is enabled).
#[macro_export]
macro_rules! twlog_debug {
    ($($arg:tt)*) => {
        ::tracing::debug!($($arg)*)
    };
}

/// Log macro for TRACE level.
#[macro_export]
macro_rules! twlog_trace {
    ($($arg:tt)*) => {
        ::tracing::trace!($($arg)*)
    };
}
