//! Configuration validation.
//!
//! Serde handles the syntax; this module checks value ranges and
//! reports every problem at once rather than stopping at the first.

use thiserror::Error;

use crate::config::schema::BoxConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("api.host must not be empty")]
    EmptyHost,

    #[error("log.level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &BoxConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.api.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    if config.log.level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::UnknownLogLevel(config.log.level.clone()));
    }

    let positive = [
        ("monitor.interval_ms", config.monitor.interval_ms),
        ("notify.error_deadline_ms", config.notify.error_deadline_ms),
        ("notify.status_deadline_ms", config.notify.status_deadline_ms),
        ("notify.queue_capacity", config.notify.queue_capacity as u64),
        ("latency.timeout_ms", config.latency.timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
