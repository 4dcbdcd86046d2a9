use anyhow::{Context, Result};
use dockhand::cli::Args;
use dockhand::config::Config;
use dockhand::logging::{self, LogSettings, Logger};
use dockhand::pipeline::Pipeline;
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::from_file(&args.config)?;
    args.apply_overrides(&mut config);

    logging::init(&LogSettings::from_config(&config)).context("Failed to initialize logging")?;
    let logger = Logger::new("main");
    logger.debug(format_args!("Loaded configuration from {}", args.config.display()));

    let engine = dockhand::engine::from_config(&config).context("Failed to select container engine")?;
    logger.info(format_args!("Using {} engine", engine.engine_type()));

    let outcome = match Pipeline::new(Arc::new(config), engine)
        .run(args.pipeline_options())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            logger.error(&e);
            return Err(e.into());
        }
    };

    if let Some(image) = &outcome.image {
        logger.info(format_args!("Image: {}", image));
    }
    if let Some(container) = &outcome.container {
        logger.info(format_args!("Container: {} ({})", container.name, container.id));
    }
    logger.info("Docker build completed successfully.");
    Ok(())
}
