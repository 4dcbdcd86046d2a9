//! Container engine capability layer.
//!
//! The pipeline talks to Docker/Podman only through [`ContainerEngine`], a
//! narrow interface covering the six operations it needs:
//!
//! - `probe`: liveness check
//! - `build`: image build, reported as a stream of [`BuildEvent`]s
//! - `prune_images`: remove dangling/unused images, returning reclaimed bytes
//! - `list_images` / `list_containers`: enumeration
//! - `create_container`: create (not start) a container
//!
//! Two implementations are selected by the `engine` configuration key:
//!
//! - [`ApiEngine`] (`api`, default, requires the `docker-api` feature): talks
//!   to the daemon through bollard
//! - [`CliEngine`] (`cli`): shells out to `docker` (or `engine_binary`)

use crate::config::Config;
use crate::env::{defaults, keys};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

mod cli;

#[cfg(feature = "docker-api")]
mod api;

#[cfg(test)]
pub(crate) mod fake;

pub use cli::CliEngine;

#[cfg(feature = "docker-api")]
pub use api::ApiEngine;

/// Engine operation errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Docker API error
    #[cfg(feature = "docker-api")]
    #[error("Container API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// The engine binary could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine binary exited unsuccessfully
    #[error("`{command}` exited with {}: {stderr}", exit_label(.code))]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Engine output could not be understood
    #[error("Unexpected engine output: {0}")]
    Parse(String),

    /// The requested engine is not available in this build
    #[error("Unsupported engine: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything the engine needs to build one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile location
    pub dockerfile: PathBuf,
    /// Full `name:tag` reference to apply
    pub tag: String,
    /// Build arguments
    pub build_args: Vec<(String, String)>,
}

/// One item of build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A progress or log line
    Output(String),
    /// The engine reported a build failure
    Error(String),
}

/// Which images `prune_images` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneFilter {
    /// Untagged images only
    #[default]
    Dangling,
    /// Every image not used by a container
    Unused,
}

/// Container creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContainerRequest {
    pub image: String,
    pub name: String,
    pub detached: bool,
    pub interactive: bool,
    pub tty: bool,
}

/// A created container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Image information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image ID
    pub id: String,
    /// Repository tags
    pub repo_tags: Vec<String>,
    /// Size in bytes, when the engine reports it
    pub size: Option<u64>,
}

/// Container information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
}

/// The capability interface every engine implements.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Short engine name for logging
    fn engine_type(&self) -> &'static str;

    /// Check that the engine answers.
    async fn probe(&self) -> Result<()>;

    /// Start a build and stream its output.
    ///
    /// The stream ends after the last event. A failed build yields either a
    /// [`BuildEvent::Error`] or an `Err` item.
    fn build(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>>;

    /// Remove images matching `filter`, returning the reclaimed bytes.
    async fn prune_images(&self, filter: PruneFilter) -> Result<u64>;

    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<ContainerHandle>;

    /// List containers, including stopped ones when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>>;
}

/// Engine implementation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Api,
    Cli,
}

impl FromStr for EngineKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "cli" => Ok(Self::Cli),
            other => Err(EngineError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Api => write!(f, "api"),
            EngineKind::Cli => write!(f, "cli"),
        }
    }
}

/// Create the engine named by the `engine` configuration key.
///
/// # Errors
///
/// Returns an error for unknown engine names, or when the API engine is
/// requested but unavailable.
pub fn from_config(config: &Config) -> Result<Arc<dyn ContainerEngine>> {
    let kind: EngineKind = config
        .text(keys::ENGINE)
        .unwrap_or(defaults::ENGINE)
        .parse()?;

    match kind {
        EngineKind::Cli => {
            let binary = config
                .text(keys::ENGINE_BINARY)
                .unwrap_or(defaults::ENGINE_BINARY);
            Ok(Arc::new(CliEngine::new(binary)))
        }
        #[cfg(feature = "docker-api")]
        EngineKind::Api => Ok(Arc::new(ApiEngine::connect()?)),
        #[cfg(not(feature = "docker-api"))]
        EngineKind::Api => Err(EngineError::Unsupported(
            "api (built without the docker-api feature)".to_string(),
        )),
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Parse a human-readable size as printed by Docker (`1.2GB`, `512kB`, `0B`).
///
/// Docker uses decimal units.
pub fn parse_human_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" => 1e3,
        "mb" => 1e6,
        "gb" => 1e9,
        "tb" => 1e12,
        "pb" => 1e15,
        _ => return None,
    };
    Some((number * multiplier).round() as u64)
}
