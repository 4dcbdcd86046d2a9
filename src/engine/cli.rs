//! Engine backed by the `docker` (or `podman`) command line.
//!
//! Each operation runs the binary with `tokio::process::Command`. Listing
//! commands use `--format '{{json .}}'` so every output line is one JSON
//! object.

use super::{
    BuildEvent, BuildRequest, ContainerEngine, ContainerHandle, ContainerInfo,
    CreateContainerRequest, EngineError, ImageInfo, PruneFilter, Result, parse_human_size,
};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use std::borrow::Cow;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

const JSON_FORMAT: &str = "{{json .}}";

/// Executes engine operations through the engine's CLI.
#[derive(Debug, Clone)]
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    /// Create an engine that invokes `binary` (e.g. `docker` or `podman`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Render a command line for logs, quoting each argument for the shell.
    fn command_line(&self, args: &[String]) -> String {
        std::iter::once(self.binary.as_str())
            .chain(args.iter().map(String::as_str))
            .map(|arg| shell_escape::escape(Cow::Borrowed(arg)).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the binary to completion and return its stdout.
    async fn run(&self, args: &[String]) -> Result<String> {
        let command_line = self.command_line(args);
        debug!("Running {}", command_line);

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Command {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn build_arguments(request: &BuildRequest) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "--tag".to_string(),
            request.tag.clone(),
            "--file".to_string(),
            request.dockerfile.to_string_lossy().into_owned(),
        ];
        for (key, value) in &request.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(request.context.to_string_lossy().into_owned());
        args
    }

    fn create_arguments(request: &CreateContainerRequest) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            request.name.clone(),
        ];
        if request.interactive {
            args.push("--interactive".to_string());
        }
        if request.tty {
            args.push("--tty".to_string());
        }
        args.push(request.image.clone());
        args
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    fn engine_type(&self) -> &'static str {
        "cli"
    }

    async fn probe(&self) -> Result<()> {
        let args = ["info", "--format", "{{.ServerVersion}}"].map(String::from);
        let version = self.run(&args).await?;
        debug!("Engine server version: {}", version.trim());
        Ok(())
    }

    fn build(&self, request: BuildRequest) -> BoxStream<'_, Result<BuildEvent>> {
        let args = Self::build_arguments(&request);
        let command_line = self.command_line(&args);
        debug!("Running {}", command_line);

        let spawned = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                let error = EngineError::Spawn {
                    program: self.binary.clone(),
                    source,
                };
                return stream::once(future::ready(Err(error))).boxed();
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let error = EngineError::Parse("build process has no output pipes".to_string());
            return stream::once(future::ready(Err(error))).boxed();
        };

        // BuildKit writes progress to stderr, the legacy builder to stdout.
        let output = stream::select(line_stream(stdout), line_stream(stderr));

        let exit = stream::once(async move {
            match child.wait().await {
                Ok(status) if status.success() => None,
                Ok(status) => Some(Err(EngineError::Command {
                    command: command_line,
                    code: status.code(),
                    stderr: String::new(),
                })),
                Err(e) => Some(Err(EngineError::Io(e))),
            }
        })
        .filter_map(future::ready);

        output.chain(exit).boxed()
    }

    async fn prune_images(&self, filter: PruneFilter) -> Result<u64> {
        let mut args = ["image", "prune", "--force"].map(String::from).to_vec();
        match filter {
            PruneFilter::Dangling => {
                args.push("--filter".to_string());
                args.push("dangling=true".to_string());
            }
            PruneFilter::Unused => args.push("--all".to_string()),
        }

        let output = self.run(&args).await?;
        Ok(parse_reclaimed_space(&output).unwrap_or(0))
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let args = ["images", "--format", JSON_FORMAT].map(String::from);
        let output = self.run(&args).await?;
        parse_json_lines::<CliImage>(&output)
            .map(|images| images.into_iter().map(ImageInfo::from).collect())
    }

    async fn create_container(&self, request: &CreateContainerRequest) -> Result<ContainerHandle> {
        let output = self.run(&Self::create_arguments(request)).await?;
        let id = output.trim();
        if id.is_empty() {
            return Err(EngineError::Parse(
                "container create returned no container ID".to_string(),
            ));
        }

        Ok(ContainerHandle {
            id: id.to_string(),
            name: request.name.clone(),
        })
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let mut args = ["ps", "--format", JSON_FORMAT].map(String::from).to_vec();
        if all {
            args.push("--all".to_string());
        }

        let output = self.run(&args).await?;
        parse_json_lines::<CliContainer>(&output)
            .map(|containers| containers.into_iter().map(ContainerInfo::from).collect())
    }
}

/// Turn a pipe into a stream of build events, one per line.
fn line_stream<R>(reader: R) -> BoxStream<'static, Result<BuildEvent>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let lines = BufReader::new(reader).lines();
    stream::unfold(Some(lines), |state| async move {
        let mut lines = state?;
        match lines.next_line().await {
            Ok(Some(line)) => Some((Ok(classify_line(line)), Some(lines))),
            Ok(None) => None,
            Err(e) => Some((Err(EngineError::Io(e)), None)),
        }
    })
    .boxed()
}

/// BuildKit reports fatal failures as lines starting with `ERROR:`.
fn classify_line(line: String) -> BuildEvent {
    let trimmed = line.trim_start();
    if trimmed.starts_with("ERROR:") || trimmed.starts_with("error:") {
        BuildEvent::Error(line)
    } else {
        BuildEvent::Output(line)
    }
}

fn parse_reclaimed_space(output: &str) -> Option<u64> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("Total reclaimed space:"))
        .and_then(parse_human_size)
}

fn parse_json_lines<T: for<'de> Deserialize<'de>>(output: &str) -> Result<Vec<T>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| EngineError::Parse(format!("{}: {}", e, line)))
        })
        .collect()
}

/// One line of `docker images --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliImage {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    repository: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    size: String,
}

impl From<CliImage> for ImageInfo {
    fn from(image: CliImage) -> Self {
        let repo_tags = if image.repository.is_empty() || image.repository == "<none>" {
            Vec::new()
        } else {
            vec![format!("{}:{}", image.repository, image.tag)]
        };

        ImageInfo {
            id: image.id,
            repo_tags,
            size: parse_human_size(&image.size),
        }
    }
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliContainer {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
}

impl From<CliContainer> for ContainerInfo {
    fn from(container: CliContainer) -> Self {
        ContainerInfo {
            id: container.id,
            names: container
                .names
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
            image: container.image,
            state: container.state,
        }
    }
}
