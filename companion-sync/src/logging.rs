//! Tracing subscriber setup for the CLI

use crate::error::{SyncError, SyncResult};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> String {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    format!("companion_sync={},sqlx=warn,reqwest=info", level)
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_tracing(verbose: bool, json: bool) -> SyncResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into());

    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(std::io::stderr)
                    .json(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| SyncError::Configuration(format!("Failed to initialize tracing: {}", e)))
}
