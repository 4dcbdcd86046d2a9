//! Command line argument parsing
//!
//! - `-c/--config`: configuration file (required)
//! - `-v/--verbose`, `-l/--logging`: console and file log sinks
//! - `-b/--build-image [DOCKERFILE]`: build the image
//! - `-C/--create-container`: build the image and create a container
//! - `--engine`: engine override

use crate::config::Config;
use crate::engine::EngineKind;
use crate::env::{defaults, keys};
use crate::pipeline::PipelineOptions;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dockhand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Check host dependencies, build a timestamped Docker image and create a container from it"
)]
#[command(long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: PathBuf,

    /// Print log messages to the console
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Write log messages to the log file
    #[arg(short = 'l', long = "logging")]
    pub logging: bool,

    /// Build the image, optionally from the named Dockerfile
    #[arg(
        short = 'b',
        long = "build-image",
        value_name = "DOCKERFILE",
        num_args = 0..=1,
        default_missing_value = defaults::DOCKERFILE
    )]
    pub build_image: Option<String>,

    /// Build the image and create a container from it
    #[arg(short = 'C', long = "create-container")]
    pub create_container: bool,

    /// Engine implementation (api or cli)
    #[arg(long = "engine", value_name = "ENGINE")]
    pub engine: Option<EngineKind>,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Write command line overrides into the custom tier of `config`.
    ///
    /// A Dockerfile given to `--build-image` becomes the `dockerfile` value
    /// and is appended to `required_config_files`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.verbose {
            config.add_custom_value(keys::VERBOSE, true);
        }
        if self.logging {
            config.add_custom_value(keys::LOGGING_ENABLED, true);
        }
        if let Some(dockerfile) = &self.build_image {
            config.add_custom_value(keys::DOCKERFILE, dockerfile.as_str());
            config.add_custom_value(keys::REQUIRED_CONFIG_FILES, vec![dockerfile.clone()]);
        }
        if let Some(engine) = self.engine {
            config.add_custom_value(keys::ENGINE, engine.to_string());
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            build_image: self.build_image.is_some(),
            create_container: self.create_container,
        }
    }
}
