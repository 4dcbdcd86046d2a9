//! Engine service management.
//!
//! Liveness is probed through the engine itself. Starting the service runs
//! a privileged system command (`sudo service docker start` by default).
//! Nothing is cached: every call re-probes.

use super::{EnvironmentError, Result};
use crate::config::Config;
use crate::engine::ContainerEngine;
use crate::env::{defaults, keys};
use crate::logging::Logger;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Observed state of the engine service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not probed yet
    Unknown,
    /// The engine answered a probe
    Running,
    /// The engine did not answer
    Stopped,
    /// A start attempt is in progress
    Starting,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Unknown => write!(f, "unknown"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Starting => write!(f, "starting"),
        }
    }
}

/// Checks and starts the container engine's background service.
pub struct ServiceManager {
    engine: Arc<dyn ContainerEngine>,
    start_command: Vec<String>,
    logger: Logger,
}

impl ServiceManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, start_command: Vec<String>) -> Self {
        Self {
            engine,
            start_command,
            logger: Logger::new("ServiceManager"),
        }
    }

    /// Build a manager using the `service_start_command` configuration key.
    pub fn from_config(config: &Config, engine: Arc<dyn ContainerEngine>) -> Self {
        let start_command = config
            .list(keys::SERVICE_START_COMMAND)
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| {
                defaults::SERVICE_START_COMMAND
                    .iter()
                    .map(|part| part.to_string())
                    .collect()
            });
        Self::new(engine, start_command)
    }

    /// Probe the engine. Any probe failure counts as "not running".
    pub async fn is_running(&self) -> bool {
        match self.engine.probe().await {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .debug(format_args!("{} engine probe failed: {}", self.engine.engine_type(), e));
                false
            }
        }
    }

    /// Run the start command once. Returns whether it exited successfully.
    pub async fn start(&self) -> bool {
        let Some((program, args)) = self.start_command.split_first() else {
            self.logger.error("No service start command configured");
            return false;
        };

        self.logger.info(format_args!(
            "Engine is not running, attempting to start it: {}",
            self.start_command.join(" ")
        ));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                self.logger.error(format_args!(
                    "Failed to start engine service. Error: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
                false
            }
            Err(e) => {
                self.logger
                    .error(format_args!("Failed to run {}: {}", program, e));
                false
            }
        }
    }

    /// Make sure the engine is running, starting it once if needed.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::Service`] if the engine is still not
    /// running after the start attempt.
    pub async fn ensure_running(&self) -> Result<ServiceState> {
        let mut state = ServiceState::Unknown;
        self.logger.debug(format_args!("Engine service state: {}", state));

        state = if self.is_running().await {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        };
        self.logger.debug(format_args!("Engine service state: {}", state));

        if state == ServiceState::Running {
            self.logger.info("Engine is already running.");
            return Ok(state);
        }

        state = ServiceState::Starting;
        self.logger.debug(format_args!("Engine service state: {}", state));

        if self.start().await && self.is_running().await {
            self.logger.info("Engine service started.");
            return Ok(ServiceState::Running);
        }

        Err(EnvironmentError::Service(format!(
            "{} engine is not running and could not be started",
            self.engine.engine_type()
        )))
    }
}
