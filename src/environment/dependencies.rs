//! External command and required file checks.

use super::{EnvironmentError, Result, ServiceManager};
use crate::config::Config;
use crate::env::{keys, resolve_in_dir};
use crate::logging::Logger;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Validates that the host can run the pipeline.
pub struct DependencyChecker {
    config: Arc<Config>,
    service: ServiceManager,
    logger: Logger,
}

impl DependencyChecker {
    pub fn new(config: Arc<Config>, service: ServiceManager) -> Self {
        Self {
            config,
            service,
            logger: Logger::new("DependencyChecker"),
        }
    }

    /// Verify every command in `os_dependencies` resolves on the search path.
    ///
    /// The search path is `dependency_search_path` when set, `$PATH`
    /// otherwise. An absent or empty list passes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::MissingDependencies`] naming every command
    /// that could not be found.
    pub fn check_dependencies(&self) -> Result<()> {
        let commands = self.config.list(keys::OS_DEPENDENCIES).unwrap_or_default();
        if commands.is_empty() {
            self.logger.debug("No dependencies configured");
            return Ok(());
        }

        let search_path = self
            .config
            .text(keys::DEPENDENCY_SEARCH_PATH)
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let missing: Vec<String> = commands
            .iter()
            .filter(|command| {
                match which::which_in(command.as_str(), search_path.as_ref(), &cwd) {
                    Ok(path) => {
                        self.logger
                            .debug(format_args!("Found {} at {}", command, path.display()));
                        false
                    }
                    Err(_) => true,
                }
            })
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(EnvironmentError::MissingDependencies(missing));
        }

        self.logger.info("All dependencies are satisfied.");
        Ok(())
    }

    /// Verify every file in `required_config_files` exists.
    ///
    /// Names are resolved against `config_files_dir` unless they already
    /// start with it.
    ///
    /// # Errors
    ///
    /// Returns [`EnvironmentError::MissingFiles`] naming every missing file.
    pub fn check_required_files(&self) -> Result<()> {
        let files = self
            .config
            .list(keys::REQUIRED_CONFIG_FILES)
            .unwrap_or_default();
        let base = self.config.text(keys::CONFIG_FILES_DIR).map(Path::new);

        let missing: Vec<String> = files
            .iter()
            .filter(|file| !resolve_in_dir(base, file).is_file())
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(EnvironmentError::MissingFiles(missing));
        }

        if !files.is_empty() {
            self.logger.info("All required files are present.");
        }
        Ok(())
    }

    /// Run every precondition, returning the first failure.
    ///
    /// Order: required configuration fields, commands, files, engine service.
    ///
    /// # Errors
    ///
    /// Returns the [`EnvironmentError`] of the first failing check.
    pub async fn try_prepare_environment(&self) -> Result<()> {
        let missing = self.config.missing_required();
        if !missing.is_empty() {
            return Err(EnvironmentError::Configuration(missing));
        }

        self.check_dependencies()?;
        self.check_required_files()?;
        self.service.ensure_running().await?;
        Ok(())
    }

    /// Run every precondition, terminating the process with status 1 on failure.
    pub async fn prepare_environment(&self) {
        if let Err(e) = self.try_prepare_environment().await {
            self.logger.error(&e);
            std::process::exit(1);
        }
    }
}
