//! Logger setup for the command line tool and thin wrappers over the `log`
//! macros.

use log::{info, log_enabled, Level, LevelFilter};

/// Initializes the logger with the `env_logger` crate.
///
/// `RUST_LOG` takes precedence; without it, `info` is used.
pub fn init_logger() {
    init_logger_with_level(LevelFilter::Info);
}

/// Initializes `env_logger` with `default` unless `RUST_LOG` is set.
///
/// Calling it again is harmless; the first logger stays installed.
pub fn init_logger_with_level(default: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}
