//! The build pipeline: prepare the environment, build, create a container.
//!
//! Stages run strictly in order and each one finishes before the next
//! begins. Environment failures abort immediately; a build that produces no
//! image skips container creation.

use crate::config::Config;
use crate::container::ContainerManager;
use crate::engine::{ContainerEngine, ContainerHandle};
use crate::environment::{DependencyChecker, EnvironmentError, ServiceManager};
use crate::image::{ImageBuilder, ImageReference, TagGenerator};
use crate::logging::Logger;
use std::sync::Arc;

/// Which stages to run after environment preparation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub build_image: bool,
    pub create_container: bool,
}

/// Pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("Image build failed, no image to create a container from")]
    BuildFailed,

    #[error("Container creation failed for image {0}")]
    CreateFailed(String),
}

/// What a successful run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub image: Option<ImageReference>,
    pub container: Option<ContainerHandle>,
}

pub struct Pipeline {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    tags: Option<TagGenerator>,
    logger: Logger,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config,
            engine,
            tags: None,
            logger: Logger::new("Pipeline"),
        }
    }

    /// Use `tags` instead of the system clock and git for image tags.
    pub fn with_tag_generator(mut self, tags: TagGenerator) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Run the pipeline.
    ///
    /// Creating a container implies building the image first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Environment`] if a precondition fails,
    /// [`PipelineError::BuildFailed`] if a requested build produced no image
    /// and [`PipelineError::CreateFailed`] if container creation failed.
    pub async fn run(self, options: PipelineOptions) -> Result<PipelineOutcome, PipelineError> {
        let service = ServiceManager::from_config(&self.config, self.engine.clone());
        let checker = DependencyChecker::new(self.config.clone(), service);
        checker.try_prepare_environment().await?;
        self.logger.info("Environment is ready.");

        let mut outcome = PipelineOutcome::default();
        if !(options.build_image || options.create_container) {
            return Ok(outcome);
        }

        let mut builder = ImageBuilder::new(self.config.clone(), self.engine.clone());
        if let Some(tags) = self.tags {
            builder = builder.with_tag_generator(tags);
        }
        let image = builder.build_image().await.ok_or(PipelineError::BuildFailed)?;
        outcome.image = Some(image.clone());

        if options.create_container {
            let manager = ContainerManager::new(self.config.clone(), self.engine.clone());
            let reference = image.to_string();
            let handle = manager
                .create_container(&reference)
                .await
                .ok_or(PipelineError::CreateFailed(reference))?;
            outcome.container = Some(handle);
        }

        Ok(outcome)
    }
}
