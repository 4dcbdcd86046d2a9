//! Image building and management.
//!
//! [`ImageBuilder`] resolves the image name, tag, Dockerfile and build
//! arguments from configuration, runs the build through a
//! [`ContainerEngine`], and streams the build output into the log as it
//! arrives. Build failures are caught here: [`ImageBuilder::build_image`]
//! logs them and returns `None`.

pub mod tag;

pub use tag::{
    Clock, FixedClock, FixedRevision, GitRevision, RevisionSource, SystemClock, TagError,
    TagGenerator,
};

use crate::config::Config;
use crate::engine::{BuildEvent, BuildRequest, ContainerEngine, EngineError, ImageInfo, PruneFilter};
use crate::env::{defaults, keys, resolve_in_dir};
use crate::logging::Logger;
use futures::StreamExt;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Image build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Invalid or missing build parameters; nothing was sent to the engine
    #[error("Validation error: {0}")]
    Validation(String),

    /// The build itself reported an error
    #[error("Docker build failed: {0}")]
    Build(String),

    /// The engine could not be reached or rejected the request
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl From<TagError> for BuildError {
    fn from(e: TagError) -> Self {
        BuildError::Validation(e.to_string())
    }
}

/// An image `name[:tag]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    name: String,
    tag: Option<String>,
}

impl ImageReference {
    /// Create a validated reference for a build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Validation`] if the name is empty or contains a
    /// path separator, or if the tag is empty or not a valid tag.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Result<Self, BuildError> {
        let name = name.into();
        let tag = tag.into();

        if name.trim().is_empty() {
            return Err(BuildError::Validation("Image name is empty".to_string()));
        }
        if name.contains(['/', '\\']) {
            return Err(BuildError::Validation(format!(
                "Image name '{}' must not contain path separators",
                name
            )));
        }
        if name.contains(char::is_whitespace) || name.contains(':') {
            return Err(BuildError::Validation(format!("Invalid image name '{}'", name)));
        }
        if tag.is_empty() {
            return Err(BuildError::Validation("Image tag is empty".to_string()));
        }
        if tag.contains(|c: char| c.is_whitespace() || matches!(c, '/' | '\\' | ':')) {
            return Err(BuildError::Validation(format!("Invalid image tag '{}'", tag)));
        }

        Ok(Self {
            name,
            tag: Some(tag),
        })
    }

    /// Split a reference into name and optional tag without validating it.
    ///
    /// The tag is whatever follows the last `:` unless that part contains a
    /// `/` (a registry port, as in `host:5000/app`).
    pub fn parse(reference: &str) -> Self {
        match reference.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') && !tag.is_empty() => Self {
                name: name.to_string(),
                tag: Some(tag.to_string()),
            },
            Some((name, "")) => Self {
                name: name.to_string(),
                tag: None,
            },
            _ => Self {
                name: reference.to_string(),
                tag: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The tag, or `latest` when the reference carries none.
    pub fn tag_or_default(&self) -> &str {
        self.tag.as_deref().unwrap_or(defaults::IMAGE_TAG)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.name, tag),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Builds images from configuration.
pub struct ImageBuilder {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    tags: TagGenerator,
    logger: Logger,
}

impl ImageBuilder {
    /// Create a builder that tags images with the system clock and git.
    pub fn new(config: Arc<Config>, engine: Arc<dyn ContainerEngine>) -> Self {
        let tags = TagGenerator::from_config(&config);
        Self {
            config,
            engine,
            tags,
            logger: Logger::new("ImageBuilder"),
        }
    }

    /// Replace the tag generator.
    pub fn with_tag_generator(mut self, tags: TagGenerator) -> Self {
        self.tags = tags;
        self
    }

    /// Resolve and validate everything the engine needs for a build.
    async fn build_request(&self) -> Result<(ImageReference, BuildRequest), BuildError> {
        let image_name = self
            .config
            .text(keys::IMAGE_NAME)
            .ok_or_else(|| BuildError::Validation("Image name is not configured".to_string()))?;
        let tag_format = self
            .config
            .text(keys::TAG_FORMAT)
            .unwrap_or(defaults::TAG_FORMAT);

        let reference = ImageReference::new(image_name, self.tags.create_tag(tag_format).await?)?;

        let base = self.config.text(keys::CONFIG_FILES_DIR).map(Path::new);
        let dockerfile = resolve_in_dir(
            base,
            self.config
                .text(keys::DOCKERFILE)
                .unwrap_or(defaults::DOCKERFILE),
        );
        let context = PathBuf::from(
            self.config
                .text(keys::BUILD_CONTEXT)
                .unwrap_or(defaults::BUILD_CONTEXT),
        );
        let build_args = parse_build_args(self.config.list(keys::BUILD_ARGS).unwrap_or_default())?;

        let request = BuildRequest {
            context,
            dockerfile,
            tag: reference.to_string(),
            build_args,
        };
        Ok((reference, request))
    }

    /// Build the configured image, returning its reference.
    ///
    /// Each build line is logged as it arrives. The first error line stops
    /// the build stream; remaining output is not consumed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Validation`] before contacting the engine if the
    /// parameters are invalid, [`BuildError::Build`] if the build reports an
    /// error, and [`BuildError::Engine`] for transport failures.
    pub async fn try_build_image(&self) -> Result<ImageReference, BuildError> {
        let (reference, request) = self.build_request().await?;

        self.logger.info(format_args!(
            "Building image {} from {} (context {})",
            reference,
            request.dockerfile.display(),
            request.context.display()
        ));

        let mut events = self.engine.build(request);
        while let Some(event) = events.next().await {
            match event? {
                BuildEvent::Output(line) => self.logger.info(line),
                BuildEvent::Error(message) => return Err(BuildError::Build(message)),
            }
        }
        drop(events);

        self.logger
            .info(format_args!("Successfully built image: {}", reference));

        if self.config.flag(keys::PRUNE_AFTER_BUILD).unwrap_or(true) {
            self.prune_dangling_images().await;
        }

        Ok(reference)
    }

    /// Build the configured image, logging any failure and returning `None`.
    pub async fn build_image(&self) -> Option<ImageReference> {
        match self.try_build_image().await {
            Ok(reference) => Some(reference),
            Err(e) => {
                self.logger.error(format_args!("Image build failed: {}", e));
                None
            }
        }
    }

    async fn prune_dangling_images(&self) {
        match self.engine.prune_images(PruneFilter::Dangling).await {
            Ok(reclaimed) => self.logger.info(format_args!(
                "Pruned dangling images, reclaimed {}",
                format_bytes(reclaimed)
            )),
            Err(e) => self
                .logger
                .warn(format_args!("Failed to prune dangling images: {}", e)),
        }
    }

    /// List local images. Engine failures are logged and yield an empty list.
    pub async fn list_images(&self) -> Vec<ImageInfo> {
        match self.engine.list_images().await {
            Ok(images) => images,
            Err(e) => {
                self.logger
                    .error(format_args!("Failed to list images: {}", e));
                Vec::new()
            }
        }
    }
}

fn parse_build_args(args: &[String]) -> Result<Vec<(String, String)>, BuildError> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(BuildError::Validation(format!(
                "Invalid build argument '{}', expected KEY=VALUE",
                arg
            ))),
        })
        .collect()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];

    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}
