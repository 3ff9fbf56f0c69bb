//! Logging initialization using the `tracing` ecosystem.
//!
//! Provides:
//! - Console output, human-readable or JSON lines
//! - File output (daily rotation via `tracing-appender`, always JSON so log
//!   shippers can index `trade_id` and friends)
//! - Configurable log level via env var `RUST_LOG` or explicit parameter

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Should be called once at program start. Calling it twice is harmless: the
/// second registration is ignored.
///
/// # Parameters
///
/// - `log_level`: default level if `RUST_LOG` env var is not set (e.g. `"info"`)
/// - `log_dir`: optional directory for daily-rotating log files
/// - `module_name`: used as the log file prefix (e.g. `"stopline"`)
/// - `json_console`: emit JSON lines on the console instead of pretty text
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str, json_console: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_pretty = (!json_console).then(|| fmt::layer().with_target(true).with_ansi(true));
    let console_json = json_console.then(|| fmt::layer().json().with_target(true));

    let file_layer = log_dir.map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, module_name);
        fmt::layer().json().with_writer(file_appender).with_ansi(false).with_target(true)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_pretty)
        .with(console_json)
        .with(file_layer)
        .try_init();
}
