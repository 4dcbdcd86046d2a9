//! Environment preconditions for the build pipeline.
//!
//! - [`DependencyChecker`]: external commands and required files
//! - [`ServiceManager`]: engine service liveness and start-up
//!
//! Failures here are fatal: the pipeline cannot run without them and nothing
//! is retried.

mod dependencies;
mod service;

pub use dependencies::DependencyChecker;
pub use service::{ServiceManager, ServiceState};

/// Environment preparation errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    /// Required configuration fields have no value
    #[error("Missing required configuration fields: {}", .0.join(", "))]
    Configuration(Vec<String>),

    /// Commands that do not resolve on the search path
    #[error("Missing dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    /// Required files that do not exist
    #[error("Missing required files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// The engine service is unreachable and could not be started
    #[error("Service error: {0}")]
    Service(String),
}

/// Result type for environment checks.
pub type Result<T> = std::result::Result<T, EnvironmentError>;
