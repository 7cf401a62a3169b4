//! Notification types shared by producers and subscribers.

use thiserror::Error;

use crate::backend::BackendError;

/// Liveness result of one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Whether the controller answered.
    pub up: bool,
    /// True only on the cycle where the status flips from down to up.
    pub transitioned_from_down: bool,
}

/// Discriminant of an [`Event`], used for policy lookups and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Error,
    Status,
}

/// A notification fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A liveness probe failed.
    Error { cause: BackendError },
    /// A liveness probe completed.
    Status(StatusChange),
}

/// Returned when an accessor is used on the wrong variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("expected {expected:?} notification, got {actual:?}")]
    WrongVariant { expected: EventKind, actual: EventKind },
}

impl Event {
    pub fn error(cause: BackendError) -> Self {
        Self::Error { cause }
    }

    pub fn status(up: bool, transitioned_from_down: bool) -> Self {
        Self::Status(StatusChange {
            up,
            transitioned_from_down,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Error { .. } => EventKind::Error,
            Self::Status(_) => EventKind::Status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind() == EventKind::Error
    }

    /// The status payload, or [`EventError::WrongVariant`] for an error event.
    pub fn as_status(&self) -> Result<StatusChange, EventError> {
        match self {
            Self::Status(change) => Ok(*change),
            other => Err(EventError::WrongVariant {
                expected: EventKind::Status,
                actual: other.kind(),
            }),
        }
    }

    /// The failure cause, or [`EventError::WrongVariant`] for a status event.
    pub fn as_error(&self) -> Result<&BackendError, EventError> {
        match self {
            Self::Error { cause } => Ok(cause),
            other => Err(EventError::WrongVariant {
                expected: EventKind::Error,
                actual: other.kind(),
            }),
        }
    }
}
