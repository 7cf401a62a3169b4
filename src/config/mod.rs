//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML or JSON)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BoxConfig (validated, immutable)
//!     → handed to the Engine at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{expand_home_path, load_config, ConfigError};
pub use schema::ApiConfig;
pub use schema::BoxConfig;
pub use schema::LatencyConfig;
pub use schema::LogConfig;
pub use schema::MonitorConfig;
pub use schema::NotifyConfig;
