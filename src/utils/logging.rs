//! Logging utilities
//!
//! Engine events go to a log file in the data directory. Both `tracing` events
//! and `log` records are captured.

use std::path::PathBuf;

use color_eyre::eyre::{Result, WrapErr};
use lazy_static::lazy_static;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt, Layer,
};

use super::paths::{get_data_dir, LOG_ENV, LOG_FILE};

lazy_static! {
    pub static ref DEFAULT_FILTER: String = format!("{}=info", env!("CARGO_CRATE_NAME"));
}

/// Pick the first configured filter: `RUST_LOG`, then the crate level variable
fn resolve_filter(rust_log: Option<String>, crate_level: Option<String>) -> String {
    rust_log
        .or(crate_level)
        .filter(|filter| !filter.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.clone())
}

/// Install a file subscriber in the data directory and return the log path
pub fn initialize_logging() -> Result<PathBuf> {
    let directory = get_data_dir();
    std::fs::create_dir_all(&directory)
        .wrap_err_with(|| format!("creating {}", directory.display()))?;
    let log_path = directory.join(LOG_FILE.as_str());
    let log_file = std::fs::File::create(&log_path)
        .wrap_err_with(|| format!("creating {}", log_path.display()))?;

    let filter = resolve_filter(
        std::env::var("RUST_LOG").ok(),
        std::env::var(LOG_ENV.as_str()).ok(),
    );
    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_target(true)
        .with_ansi(false)
        .with_filter(EnvFilter::try_new(&filter)?);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()?;

    log::info!("Logging to {} with filter {filter}", log_path.display());
    Ok(log_path)
}

/// Similar to the `std::dbg!` macro, but generates `tracing` events rather
/// than printing to stdout.
///
/// By default, the verbosity level for the generated events is `DEBUG`, but
/// this can be customized.
#[macro_export]
macro_rules! trace_dbg {
    (target: $target:expr, level: $level:expr, $ex:expr) => {{
        match $ex {
            value => {
                tracing::event!(target: $target, $level, ?value, stringify!($ex));
                value
            }
        }
    }};
    (level: $level:expr, $ex:expr) => {
        $crate::trace_dbg!(target: module_path!(), level: $level, $ex)
    };
    (target: $target:expr, $ex:expr) => {
        $crate::trace_dbg!(target: $target, level: tracing::Level::DEBUG, $ex)
    };
    ($ex:expr) => {
        $crate::trace_dbg!(level: tracing::Level::DEBUG, $ex)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case(Some("debug"), Some("warn"), "debug")]
    #[case(None, Some("chat_pager=trace"), "chat_pager=trace")]
    #[case(None, None, "chat_pager=info")]
    #[case(Some("  "), None, "chat_pager=info")]
    fn test_resolve_filter(
        #[case] rust_log: Option<&str>,
        #[case] crate_level: Option<&str>,
        #[case] expected: &str,
    ) {
        let filter = resolve_filter(
            rust_log.map(str::to_string),
            crate_level.map(str::to_string),
        );
        assert_eq!(filter, expected);
    }

    #[test]
    fn test_trace_dbg_returns_value() {
        let value = crate::trace_dbg!(21 * 2);
        assert_eq!(value, 42);
    }
}
