//! Logging Façade (spec §4.8) plus small process-wide utilities shared by
//! the collector binary.
//!
//! Logging is configured via the [`ENV_LOG_LEVEL`](crate::ENV_LOG_LEVEL)
//! environment variable (falls back to the level passed by the caller).
//! Two layers are always installed: an always-on stdout `fmt` layer, and a
//! rotating file layer written through `tracing-appender`.
//!
//! `tracing-appender` only supports time-based rotation, not size-based; the
//! "~10 MB, 5 backups" requirement is approximated with daily rotation
//! capped at 5 retained files (see DESIGN.md for this open-question
//! resolution).

use std::str::FromStr;

use tracing::trace;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::ENV_LOG_LEVEL;

/// Guard returned by [`init_logging`]. Must be held for the life of the
/// process: dropping it stops the background thread that flushes the
/// rotating file writer.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initializes the logging system with the specified default level.
///
/// The level can be overridden by setting the [`ENV_LOG_LEVEL`] environment
/// variable to one of `TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`. Log lines go
/// both to stdout and to a daily-rotated file under `log_dir` (named
/// `gnm-collector.log.<date>`), capped at 5 retained files.
///
/// # Exits
///
/// Exits the process with status code 1 if an invalid level is given via
/// the environment variable, or if a global subscriber was already set.
pub fn init_logging(level: tracing::Level, log_dir: &str) -> LoggingGuard {
    let level = match std::env::var(ENV_LOG_LEVEL) {
        Err(_) => level,
        Ok(raw) => match tracing::Level::from_str(&raw) {
            Err(e) => {
                eprintln!(
                    "Bad log level was given with the environment variable '{ENV_LOG_LEVEL}': '{raw}', must be one of 'TRACE', 'DEBUG', 'INFO', 'WARN', 'ERROR'"
                );
                eprintln!("{e}");
                std::process::exit(1)
            }
            Ok(ll) => ll,
        },
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("gnm-collector")
        .filename_suffix("log")
        .max_log_files(5)
        .build(log_dir)
        .expect("could not build the rotating log file appender");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer().with_target(false).with_ansi(false).with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .expect("setting the global tracing subscriber failed");

    trace!("logging initialized with level {level}");
    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Sets up a custom panic handler for user-friendly error reporting.
///
/// Should be called early in the program's startup. In debug builds, uses
/// the default panic handler for detailed debugging output.
pub fn setup_panic_handler() {
    if !cfg!(debug_assertions) {
        std::panic::set_hook(Box::new(|panic_info| {
            let mut message = String::new();
            message.push_str("\nWell, this is embarrassing.\n\n");
            message.push_str(&format!(
                "{} had a problem and crashed. This is a bug and should be reported!\n\n",
                env!("CARGO_PKG_NAME")
            ));

            message.push_str("Technical details:\n");
            message.push_str(&format!("Version:     {}\n", env!("CARGO_PKG_VERSION")));

            #[cfg(target_os = "linux")]
            let os = "linux";
            #[cfg(target_os = "macos")]
            let os = "macos";
            #[cfg(target_os = "windows")]
            let os = "windows";

            message.push_str(&format!("OS:          {} {}\n", os, std::env::consts::ARCH));

            let args: Vec<_> = std::env::args().collect();
            message.push_str(&format!("Command:     {}\n", args.join(" ")));

            if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
                message.push_str(&format!("Error:       {}\n", msg));
            } else if let Some(msg) = panic_info.payload().downcast_ref::<String>() {
                message.push_str(&format!("Error:       {}\n", msg));
            }

            if let Some(location) = panic_info.location() {
                message.push_str(&format!("Location:    {}:{}\n", location.file(), location.line()));
            }

            message.push_str("\nPlease file an issue with the above technical details and what you were doing when this happened.\n");

            eprintln!("{}", message);
            std::process::exit(1);
        }));
    }
}
