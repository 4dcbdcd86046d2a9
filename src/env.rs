//! Environment constants and path utilities for dockhand.
//!
//! This module centralizes the configuration keys and built-in fallbacks used
//! throughout the crate, making them easier to maintain and modify.

use std::path::{Path, PathBuf};

/// Application name, also used as the tracing target prefix
pub const APP_NAME: &str = "dockhand";

/// Configuration keys understood by the pipeline components
pub mod keys {
    /// External commands that must resolve on the search path
    pub const OS_DEPENDENCIES: &str = "os_dependencies";

    /// Override for the command search path (defaults to `$PATH`)
    pub const DEPENDENCY_SEARCH_PATH: &str = "dependency_search_path";

    /// Base directory for required files and the Dockerfile
    pub const CONFIG_FILES_DIR: &str = "config_files_dir";

    /// Files that must exist before building
    pub const REQUIRED_CONFIG_FILES: &str = "required_config_files";

    /// Image repository name (no path separators)
    pub const IMAGE_NAME: &str = "image_name";

    /// strftime pattern for the tag timestamp
    pub const TAG_FORMAT: &str = "tag_format";

    /// Dockerfile name or path
    pub const DOCKERFILE: &str = "dockerfile";

    /// Build context directory
    pub const BUILD_CONTEXT: &str = "build_context";

    /// Build arguments as `KEY=VALUE` strings
    pub const BUILD_ARGS: &str = "build_args";

    /// Whether to prune dangling images after a successful build
    pub const PRUNE_AFTER_BUILD: &str = "prune_after_build";

    /// Directory used to read the VCS revision
    pub const REVISION_DIR: &str = "revision_dir";

    /// Base name for created containers
    pub const CONTAINER_NAME: &str = "container_name";

    /// Engine implementation: `api` or `cli`
    pub const ENGINE: &str = "engine";

    /// Binary invoked by the CLI engine
    pub const ENGINE_BINARY: &str = "engine_binary";

    /// Command used to start the engine service
    pub const SERVICE_START_COMMAND: &str = "service_start_command";

    /// Enable the file log sink
    pub const LOGGING_ENABLED: &str = "logging_enabled";

    /// Enable the console log sink
    pub const VERBOSE: &str = "verbose";

    /// Log file path
    pub const LOG_FILE: &str = "log_file";

    /// Log level name
    pub const LOG_LEVEL: &str = "log_level";
}

/// Built-in fallbacks applied when neither config tier has a value
pub mod defaults {
    pub const TAG_FORMAT: &str = "%Y%m%d%H%M%S";

    pub const DOCKERFILE: &str = "Dockerfile";

    pub const BUILD_CONTEXT: &str = ".";

    pub const ENGINE: &str = "api";

    pub const ENGINE_BINARY: &str = "docker";

    pub const SERVICE_START_COMMAND: &[&str] = &["sudo", "service", "docker", "start"];

    pub const LOG_FILE: &str = "dockhand.log";

    pub const LOG_LEVEL: &str = "info";

    /// Tag portion used in container names when a reference carries no tag
    pub const IMAGE_TAG: &str = "latest";
}

/// Resolve `name` against a base directory.
///
/// The join is skipped when `name` already starts with `base`, so configs may
/// list either bare file names or paths that include the base directory.
pub fn resolve_in_dir(base: Option<&Path>, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    match base {
        Some(base) if !base.as_os_str().is_empty() && !candidate.starts_with(base) => {
            base.join(candidate)
        }
        _ => candidate.to_path_buf(),
    }
}
