//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binaries
//! - Derive the filter from `log.level`, letting `RUST_LOG` override it
//! - Honor `log.disable`

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Filter directive for the configured level.
pub fn filter_directive(config: &LogConfig) -> String {
    if config.disable {
        "off".to_string()
    } else {
        format!("boxtray={0},boxtray_cli={0}", config.level.to_lowercase())
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = if config.disable {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
