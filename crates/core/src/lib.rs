//! Core types for perftrack
//!
//! Configuration, shared constants and the error type used by the
//! storage and CLI crates.

pub mod config;
pub mod constants;
pub mod env_config;
mod error;

pub use config::{DatabaseTarget, MigrateSettings};
pub use constants::*;
pub use env_config::env_parse_with_default;
pub use error::*;
