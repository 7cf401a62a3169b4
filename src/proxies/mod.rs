//! Proxy topology state.
//!
//! # Data Flow
//! ```text
//! GET /proxies (Topology)
//!     → snapshot.rs (classify selectors, resolve members, collect delays)
//!     → registry.rs (atomic swap of Arc<ProxySnapshot>)
//!     → GUI reads selectors/delays without locking
//!
//! Latency test result:
//!     → registry.rs update_delay (in place on the current snapshot)
//!     → bound callbacks for that node
//! ```
//!
//! # Design Decisions
//! - Selectors and delays are published together; a refresh is all or nothing
//! - Bad entries (empty selectors, unknown members) are skipped, not fatal
//! - Selectors borrow the delay of their active member

pub mod display;
pub mod registry;
pub mod snapshot;

pub use display::{latency_text, memory_text, traffic_text};
pub use registry::{DelayCallback, ProxyRegistry, RegistryError};
pub use snapshot::{ProxySnapshot, SelectorMap};
