//! # vaultorg-core
//!
//! Shared primitives for the vaultorg organization-membership backend:
//! the error taxonomy, the structured logger, and id generation.

pub mod error;
pub mod id;
pub mod logger;

// Re-exports for convenience
pub use error::{OrgError, Result};
pub use id::generate_id;
pub use logger::{LogHandler, LogLevel, LoggerConfig, OrgLogger};
