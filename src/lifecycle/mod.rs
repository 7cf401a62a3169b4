//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Init logging → Build engine → Start monitor
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Cancel tokens → Stop monitor (awaited) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One root token; every long-running task holds a child
//! - Stopping the monitor waits for its task, so nothing is emitted afterwards

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
