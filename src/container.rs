//! Container creation from built images.

use crate::config::Config;
use crate::engine::{ContainerEngine, ContainerHandle, ContainerInfo, CreateContainerRequest, EngineError};
use crate::env::keys;
use crate::image::ImageReference;
use crate::logging::Logger;
use std::sync::Arc;

/// Container creation errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// No container base name resolves from configuration
    #[error("Container name is not configured (key '{0}')")]
    MissingName(String),

    /// The image reference has no name
    #[error("Invalid image reference: '{0}'")]
    InvalidReference(String),

    /// The engine rejected the request
    #[error("Failed to create container: {0}")]
    Engine(#[from] EngineError),
}

/// Creates and lists containers.
pub struct ContainerManager {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    /// Key holding the container base name, after indirection through
    /// the `container_name` default field's `field_name`
    name_key: String,
    logger: Logger,
}

impl ContainerManager {
    pub fn new(config: Arc<Config>, engine: Arc<dyn ContainerEngine>) -> Self {
        let name_key = config
            .get_default_name(keys::CONTAINER_NAME)
            .unwrap_or(keys::CONTAINER_NAME)
            .to_string();

        Self {
            config,
            engine,
            name_key,
            logger: Logger::new("ContainerManager"),
        }
    }

    /// `<container_name>-<tag>` for `reference`, with `latest` for untagged references.
    pub fn container_name(&self, reference: &ImageReference) -> Result<String, ContainerError> {
        let base = self
            .config
            .text(&self.name_key)
            .ok_or_else(|| ContainerError::MissingName(self.name_key.clone()))?;
        Ok(format!("{}-{}", base, reference.tag_or_default()))
    }

    /// Create a detached, interactive, TTY-enabled container from `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the name cannot be resolved or the
    /// engine fails.
    pub async fn try_create_container(&self, image: &str) -> Result<ContainerHandle, ContainerError> {
        let reference = ImageReference::parse(image);
        if reference.name().is_empty() {
            return Err(ContainerError::InvalidReference(image.to_string()));
        }

        let request = CreateContainerRequest {
            image: image.to_string(),
            name: self.container_name(&reference)?,
            detached: true,
            interactive: true,
            tty: true,
        };

        self.logger.info(format_args!(
            "Creating container {} from image {}",
            request.name, request.image
        ));
        let handle = self.engine.create_container(&request).await?;
        self.logger.info(format_args!(
            "Created container {} ({})",
            handle.name, handle.id
        ));
        Ok(handle)
    }

    /// Create a container, logging any failure and returning `None`.
    pub async fn create_container(&self, image: &str) -> Option<ContainerHandle> {
        match self.try_create_container(image).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.logger.error(&e);
                None
            }
        }
    }

    /// List all containers, stopped ones included. Failures yield an empty list.
    pub async fn list_containers(&self) -> Vec<ContainerInfo> {
        match self.engine.list_containers(true).await {
            Ok(containers) => containers,
            Err(e) => {
                self.logger
                    .error(format_args!("Failed to list containers: {}", e));
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, FieldDefault};
    use crate::engine::fake::FakeEngine;

    fn manager(engine: &Arc<FakeEngine>) -> ContainerManager {
        let mut config = Config::default();
        config.add_custom_value(keys::CONTAINER_NAME, "test_container");
        ContainerManager::new(Arc::new(config), engine.clone())
    }

    fn container(id: &str, state: &str) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            names: vec![format!("test_container-{}", id)],
            image: "test_image:tag".to_string(),
            state: state.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_container_with_tag() {
        let engine = Arc::new(FakeEngine::new());
        let handle = manager(&engine)
            .create_container("image_name:tag")
            .await
            .unwrap();
        assert_eq!(handle.name, "test_container-tag");

        let requests = engine.create_requests.lock().unwrap();
        assert_eq!(
            requests[0],
            CreateContainerRequest {
                image: "image_name:tag".to_string(),
                name: "test_container-tag".to_string(),
                detached: true,
                interactive: true,
                tty: true,
            }
        );
    }

    #[tokio::test]
    async fn test_create_container_without_tag() {
        let engine = Arc::new(FakeEngine::new());
        let handle = manager(&engine).create_container("image_name").await.unwrap();
        assert_eq!(handle.name, "test_container-latest");
    }

    #[tokio::test]
    async fn test_create_container_failure() {
        let engine = Arc::new(FakeEngine::new().with_failing_create());
        let manager = manager(&engine);

        assert!(manager.create_container("image_name:tag").await.is_none());
        assert!(matches!(
            manager.try_create_container("image_name:tag").await,
            Err(ContainerError::Engine(_))
        ));
    }

    #[tokio::test]
    async fn test_create_container_without_name() {
        let engine = Arc::new(FakeEngine::new());
        let manager = ContainerManager::new(Arc::new(Config::default()), engine.clone());

        assert!(matches!(
            manager.try_create_container("image_name:tag").await,
            Err(ContainerError::MissingName(_))
        ));
        assert!(engine.create_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_container_name_follows_field_name() {
        let mut document = ConfigDocument::default();
        document.default_fields.insert(
            keys::CONTAINER_NAME.to_string(),
            FieldDefault::new("bot_container", "bot"),
        );
        let mut config = Config::from_document(document);
        config.add_custom_value("bot_container", "worker");

        let engine = Arc::new(FakeEngine::new());
        let manager = ContainerManager::new(Arc::new(config), engine);
        let reference = ImageReference::parse("bot:v2");
        assert_eq!(manager.container_name(&reference).unwrap(), "worker-v2");
    }

    #[tokio::test]
    async fn test_list_containers_includes_stopped() {
        let engine = Arc::new(
            FakeEngine::new().with_containers(vec![container("a", "running"), container("b", "exited")]),
        );
        assert_eq!(manager(&engine).list_containers().await.len(), 2);

        let engine = Arc::new(FakeEngine::new().with_failing_listing());
        assert!(manager(&engine).list_containers().await.is_empty());
    }
}
