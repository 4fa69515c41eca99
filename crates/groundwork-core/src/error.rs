//! Error types for Groundwork

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required field was not set on a task
    #[error("required field \"{0}\" is not set")]
    RequiredField(String),

    /// The declared dependencies form a cycle
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    /// A task declared a dependency that is not in the task set
    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    /// Two tasks share the same identity
    #[error("duplicate task: {0}")]
    DuplicateTask(String),

    /// The resource is not yet visible to the provider; retry with backoff
    #[error("not ready, try again later: {0}")]
    TryAgainLater(String),

    /// A transient error kept recurring past the attempt budget
    #[error("task {task} still failing after {attempts} attempts: {message}")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        message: String,
    },

    /// The provider rejected a mutation
    #[error("rendering {task}: {source}")]
    Render {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    /// Fields were left in the change set after a successful render
    #[error("task {task} completed render with unapplied changes: {fields}")]
    UnappliedChanges { task: String, fields: String },

    /// A lifecycle constraint was violated
    #[error("lifecycle violation for {task}: {message}")]
    Lifecycle { task: String, message: String },

    /// Task state did not serialize to a JSON object
    #[error("task state must be an object, got {0}")]
    InvalidState(String),

    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create a RequiredField error for the named field
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField(field.into())
    }

    /// Create a transient TryAgainLater error
    pub fn try_again_later(message: impl Into<String>) -> Self {
        Self::TryAgainLater(message.into())
    }

    /// Wrap a provider error as a render failure for the named task
    pub fn render(task: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Render {
            task: task.into(),
            source: source.into(),
        }
    }

    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error should be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TryAgainLater(_))
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_field_names_field() {
        let err = EngineError::required_field("MinSize");
        assert_eq!(err.to_string(), "required field \"MinSize\" is not set");
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::try_again_later("principal not visible").is_transient());
        assert!(!EngineError::required_field("Name").is_transient());
        assert!(!EngineError::other("boom").is_transient());
    }

    #[test]
    fn test_render_wraps_source() {
        let err = EngineError::render("iam:binding", anyhow::anyhow!("permission denied"));
        assert!(err.to_string().contains("iam:binding"));
        assert!(err.to_string().contains("permission denied"));
    }
}
