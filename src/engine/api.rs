//! Engine backed by the Docker Engine API (bollard).
//!
//! Connects to Docker first and falls back to the Podman sockets. The build
//! context is sent as an in-memory tar archive.

use super::{
    BuildEvent, BuildRequest, ContainerEngine, ContainerHandle, ContainerInfo,
    CreateContainerRequest, EngineError, ImageInfo, PruneFilter, Result,
};
use async_trait::async_trait;
use bollard::Docker;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::path::{Component, Path};
use tracing::{debug, info};

/// Archive name used for a Dockerfile that lives outside the build context.
const EXTERNAL_DOCKERFILE: &str = ".dockhand.Dockerfile";

/// Docker/Podman API engine.
#[derive(Clone)]
pub struct ApiEngine {
    docker: Docker,
}

impl ApiEngine {
    /// Connect to Docker or Podman.
    ///
    /// Tries multiple connection strategies in order:
    /// 1. Local defaults (`DOCKER_HOST`, Unix socket or Windows named pipe)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    ///
    /// No request is sent; use [`ContainerEngine::probe`] to check liveness.
    ///
    /// # Errors
    ///
    /// Returns error if no connection strategy yields a client.
    pub fn connect() -> Result<Self> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                debug!("Using container runtime via local defaults");
                return Ok(Self::with_docker(docker));
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(&socket, 120, bollard::API_DEFAULT_VERSION) {
                    Ok(docker) => {
                        info!("Using Podman via {}", socket);
                        return Ok(Self::with_docker(docker));
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(EngineError::Unsupported(
            "no Docker or Podman endpoint available".to_string(),
        ))
    }

    /// Wrap an existing bollard client.
    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Get the underlying Docker client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

/// Tar the build context, returning the archive and the Dockerfile path inside it.
fn context_archive(request: &BuildRequest) -> Result<(Vec<u8>, String)> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", &request.context)?;

    let dockerfile = match dockerfile_in_context(&request.context, &request.dockerfile) {
        Some(relative) => relative,
        None => {
            archive.append_path_with_name(&request.dockerfile, EXTERNAL_DOCKERFILE)?;
            EXTERNAL_DOCKERFILE.to_string()
        }
    };

    Ok((archive.into_inner()?, dockerfile))
}

fn dockerfile_in_context(context: &Path, dockerfile: &Path) -> Option<String> {
    if let Ok(relative) = dockerfile.strip_prefix(context) {
        return Some(relative.to_string_lossy().into_owned());
    }

    let context_is_cwd = context.components().all(|c| matches!(c, Component::CurDir));
    let stays_inside = dockerfile
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    (context_is_cwd && stays_inside).then(|| dockerfile.to_string_lossy().into_owned())
}

fn build_event(build_info: bollard::models::BuildInfo) -> Option<BuildEvent> {
    if let Some(detail) = build_info.error_detail {
        let message = detail
            .message
            .unwrap_or_else(|| "build failed without an error message".to_string());
        return Some(BuildEvent::Error(message));
    }

    build_info
        .stream
        .or(build_info.status)
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .map(BuildEvent::Output)
}

#[async_trait]
impl ContainerEngine for ApiEngine {
    fn engine_type(&self) -> &'static str {
        "api"
    }

    async fn probe(&self) -> Result<()> {
        self.docker.ping().await?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    fn build(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>> {
        let (archive, dockerfile) = match context_archive(&request) {
            Ok(parts) => parts,
            Err(e) => return stream::once(future::ready(Err(e))).boxed(),
        };
        debug!(
            "Sending {} byte build context, dockerfile {}",
            archive.len(),
            dockerfile
        );

        let options = bollard::image::BuildImageOptions {
            dockerfile,
            t: request.tag.clone(),
            rm: true,
            buildargs: request.build_args.iter().cloned().collect::<HashMap<_, _>>(),
            ..Default::default()
        };

        self.docker
            .build_image(options, None, Some(bollard::body_full(archive.into())))
            .map(|item| match item {
                Ok(build_info) => build_event(build_info).map(Ok),
                Err(bollard::errors::Error::DockerStreamError { error }) => {
                    Some(Ok(BuildEvent::Error(error)))
                }
                Err(e) => Some(Err(EngineError::Api(e))),
            })
            .filter_map(future::ready)
            .boxed()
    }

    async fn prune_images(&self, filter: PruneFilter) -> Result<u64> {
        let dangling = match filter {
            PruneFilter::Dangling => "true",
            PruneFilter::Unused => "false",
        };
        let filters = HashMap::from([("dangling".to_string(), vec![dangling.to_string()])]);

        let response = self
            .docker
            .prune_images(Some(bollard::image::PruneImagesOptions { filters }))
            .await?;

        Ok(response.space_reclaimed.unwrap_or(0).max(0) as u64)
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let images = self
            .docker
            .list_images(Some(bollard::image::ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await?;

        Ok(images
            .into_iter()
            .map(|img| ImageInfo {
                id: img.id,
                repo_tags: img.repo_tags,
                size: u64::try_from(img.size).ok(),
            })
            .collect())
    }

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<ContainerHandle> {
        let options = bollard::container::CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        };

        let attach = !request.detached;
        let config = bollard::container::Config {
            image: Some(request.image.clone()),
            tty: Some(request.tty),
            open_stdin: Some(request.interactive),
            attach_stdin: Some(attach && request.interactive),
            attach_stdout: Some(attach),
            attach_stderr: Some(attach),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!("Create warning for {}: {}", request.name, warning);
        }

        Ok(ContainerHandle {
            id: response.id,
            name: request.name.clone(),
        })
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .map(|summary| ContainerInfo {
                id: summary.id.unwrap_or_default(),
                names: summary
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|name| name.trim_start_matches('/').to_string())
                    .collect(),
                image: summary.image.unwrap_or_default(),
                state: summary
                    .state
                    .map(|state| state.to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }
}
