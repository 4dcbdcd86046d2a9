//! Scripted in-memory engine for unit tests.

use super::{
    BuildEvent, BuildRequest, ContainerEngine, ContainerHandle, ContainerInfo,
    CreateContainerRequest, EngineError, ImageInfo, PruneFilter, Result,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a scripted build emits, item by item.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Line(&'static str),
    ErrorLine(&'static str),
    ApiFailure(&'static str),
}

#[derive(Default)]
pub(crate) struct FakeEngine {
    probe_failures: usize,
    pub probes: AtomicUsize,
    build_script: Vec<Scripted>,
    /// Number of build items handed to the consumer
    pub build_items_polled: AtomicUsize,
    pub build_requests: Mutex<Vec<BuildRequest>>,
    fail_prune: bool,
    pub prunes: AtomicUsize,
    fail_create: bool,
    pub create_requests: Mutex<Vec<CreateContainerRequest>>,
    fail_listing: bool,
    images: Vec<ImageInfo>,
    containers: Vec<ContainerInfo>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` probes.
    pub fn with_probe_failures(mut self, count: usize) -> Self {
        self.probe_failures = count;
        self
    }

    pub fn with_build_script(mut self, script: Vec<Scripted>) -> Self {
        self.build_script = script;
        self
    }

    pub fn with_failing_prune(mut self) -> Self {
        self.fail_prune = true;
        self
    }

    pub fn with_failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageInfo>) -> Self {
        self.images = images;
        self
    }

    pub fn with_containers(mut self, containers: Vec<ContainerInfo>) -> Self {
        self.containers = containers;
        self
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn engine_type(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self) -> Result<()> {
        let attempt = self.probes.fetch_add(1, Ordering::SeqCst);
        if attempt < self.probe_failures {
            Err(EngineError::Parse("daemon not running".to_string()))
        } else {
            Ok(())
        }
    }

    fn build(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>> {
        self.build_requests.lock().unwrap().push(request);
        stream::iter(self.build_script.clone())
            .map(move |item| {
                self.build_items_polled.fetch_add(1, Ordering::SeqCst);
                match item {
                    Scripted::Line(line) => Ok(BuildEvent::Output(line.to_string())),
                    Scripted::ErrorLine(line) => Ok(BuildEvent::Error(line.to_string())),
                    Scripted::ApiFailure(message) => Err(EngineError::Parse(message.to_string())),
                }
            })
            .boxed()
    }

    async fn prune_images(&self, _filter: PruneFilter) -> Result<u64> {
        self.prunes.fetch_add(1, Ordering::SeqCst);
        if self.fail_prune {
            return Err(EngineError::Parse("prune failed".to_string()));
        }
        Ok(1_500_000)
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        if self.fail_listing {
            return Err(EngineError::Parse("cannot list images".to_string()));
        }
        Ok(self.images.clone())
    }

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<ContainerHandle> {
        self.create_requests.lock().unwrap().push(request.clone());
        if self.fail_create {
            return Err(EngineError::Command {
                command: "create".to_string(),
                code: Some(125),
                stderr: "Conflict. The container name is already in use".to_string(),
            });
        }
        Ok(ContainerHandle {
            id: format!("id-{}", request.name),
            name: request.name.clone(),
        })
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        if self.fail_listing {
            return Err(EngineError::Parse("cannot list containers".to_string()));
        }
        Ok(self
            .containers
            .iter()
            .filter(|container| all || container.state == "running")
            .cloned()
            .collect())
    }
}
