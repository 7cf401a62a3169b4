//! Notification subsystem.
//!
//! # Data Flow
//! ```text
//! Status monitor (producer)
//!     → Notifier::broadcast_batch
//!     → one delivery task per subscriber
//!     → try_send_with_deadline (bounded wait on the subscriber's queue)
//!     → EventQueue::recv in the subscriber
//! ```
//!
//! # Design Decisions
//! - Registry is a concurrent map; no lock is held across a send
//! - Error notifications get a short deadline, status heartbeats a longer one
//! - A dropped heartbeat is tolerable: the next cycle sends another
//! - Duplicate subscriber names panic; they are wiring bugs

pub mod notifier;
pub mod types;

pub use notifier::{EventQueue, Notifier};
pub use types::{Event, EventError, EventKind, StatusChange};
