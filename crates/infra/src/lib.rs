//! Infrastructure layer: persistence, notifier adapters, configuration and
//! the application services built on them.

pub mod config;
pub mod error;
pub mod notifier;
pub mod services;
pub mod store;

pub use config::{AppConfig, ConfigError, Environment};
pub use error::IdentityError;
pub use services::{AuthSession, IdentityServices, ServiceDeps};
