//! Application configuration
//!
//! `AppConfig` is loaded once at startup (file + CLI overrides) and read
//! lock-free through `ConfigStore`.

mod schema;
mod store;

pub use schema::{AppConfig, MediaConfig, PacingConfig, WebConfig};
pub use store::{ConfigChange, ConfigStore};
