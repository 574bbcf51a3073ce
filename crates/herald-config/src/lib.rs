//! # Herald Config
//!
//! Configuration management for Herald.
//! Supports layered configuration from files, environment variables,
//! and runtime refresh.

mod app_config;
mod jobs_config;
mod loader;
mod validation;

pub use app_config::*;
pub use jobs_config::*;
pub use loader::*;
pub use validation::*;
