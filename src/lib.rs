//! # dockhand
//!
//! A configuration-driven pipeline that prepares a host for container
//! builds, builds a timestamped Docker image and creates a container from it.
//!
//! ## Architecture Overview
//!
//! - **[`config`]**: two-tier configuration store (defaults and custom values)
//! - **[`environment`]**: dependency, required-file and engine service checks
//! - **[`image`]**: tag generation and image builds with streamed output
//! - **[`container`]**: container creation from built images
//! - **[`engine`]**: the container engine boundary (Docker API or CLI)
//! - **[`pipeline`]**: the sequential prepare → build → create run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dockhand::config::Config;
//! use dockhand::pipeline::{Pipeline, PipelineOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("docker.json")?;
//!     let engine = dockhand::engine::from_config(&config)?;
//!
//!     let outcome = Pipeline::new(Arc::new(config), engine)
//!         .run(PipelineOptions {
//!             build_image: true,
//!             create_container: true,
//!         })
//!         .await?;
//!
//!     println!("Built {:?}", outcome.image);
//!     Ok(())
//! }
//! ```

/// Two-tier configuration store.
///
/// Custom values override defaults; list values merge as sets.
pub mod config;

/// Log sinks and the per-component [`logging::Logger`] handle.
pub mod logging;

/// Container engine abstraction with Docker API and CLI implementations.
pub mod engine;

/// Host preconditions: external commands, required files, engine service.
pub mod environment;

/// Image tags and image builds.
pub mod image;

/// Container creation.
pub mod container;

/// The end-to-end build pipeline.
pub mod pipeline;

/// Configuration keys, built-in defaults and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use config::{Config, ConfigError, ConfigValue};
pub use container::{ContainerError, ContainerManager};
pub use engine::{ContainerEngine, EngineError, EngineKind};
pub use environment::{DependencyChecker, EnvironmentError, ServiceManager, ServiceState};
pub use image::{BuildError, ImageBuilder, ImageReference, TagGenerator};
pub use logging::Logger;
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, PipelineOutcome};
