//! Health monitoring and state distribution core for the boxtray client.

pub mod backend;
pub mod config;
pub mod engine;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod proxies;

pub use config::schema::BoxConfig;
pub use engine::Engine;
pub use lifecycle::Shutdown;
