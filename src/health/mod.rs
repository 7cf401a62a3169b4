//! Liveness monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer (monitor.rs)
//!     → Probe the controller (Probe trait; ApiClient implements it)
//!     → Update state.rs
//!     → Broadcast through the notifier
//!
//! State machine (state.rs):
//!     Down ←→ Up
//!     Errors reported only on the Up → Down edge
//! ```
//!
//! # Design Decisions
//! - No extra timeout around the probe; the probe owns its deadline
//! - Failed probes are retried by the next tick, never out-of-band
//! - Cancellation reaches an in-flight probe through its token

pub mod monitor;
pub mod state;

pub use monitor::{MonitorHandle, Probe, StatusMonitor};
pub use state::StatusFlag;
