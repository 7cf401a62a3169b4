//! Controller API integration subsystem.
//!
//! # Data Flow
//! ```text
//! ApiConfig (scheme, host, path, secret)
//!     → client.rs (HTTP requests with timeouts and size cap)
//!     → types.rs (Version, Topology, delay, config, memory and traffic documents)
//!     → health monitor (probe), proxy registry (topology), GUI (latency, switch,
//!       mode, live memory and traffic readings)
//! ```
//!
//! # Design Decisions
//! - Every request has a deadline; failures are values, never panics
//! - Topology keeps the controller's ordering so menus render in that order
//! - Graceful degradation when the controller is unreachable

pub mod client;
pub mod types;

pub use client::ApiClient;
pub use types::{
    BackendError, BackendResult, ControllerConfig, History, Memory, ProxyEntry, Topology, Traffic,
    Version,
};
