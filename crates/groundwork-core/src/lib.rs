//! Groundwork Core - foundational types for the reconciliation engine
//!
//! This crate provides the error taxonomy, lifecycle tags, change-set model,
//! structural differ, and configuration used by the Groundwork engine.

pub mod changes;
pub mod config;
pub mod diff;
pub mod error;
pub mod lifecycle;

pub use changes::{ChangeSet, FieldChange};
pub use config::{load_config, load_config_or_default, EngineConfig};
pub use diff::{diff_states, DiffSchema};
pub use error::{ConfigError, EngineError, Result};
pub use lifecycle::Lifecycle;
