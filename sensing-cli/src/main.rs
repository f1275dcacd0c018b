mod cli;
mod config;
mod demo;
mod error;

use std::collections::BTreeMap;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use sensing_runtime::sampling::SamplingPackageRegistry;
use sensing_runtime::{SensingContext, StudyDeployment, StudyDeploymentController};

use crate::{
    cli::{Args, Commands},
    config::AppConfig,
    demo::DevicePackage,
    error::{AppError, Result},
};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref()).await?;
    init_logging(args.verbose, args.quiet, config.log_filter())?;

    match args.command {
        Commands::Run {
            deployment,
            duration,
        } => {
            let duration = duration.or(config.duration_secs);
            run_deployment(&config, &deployment, duration).await
        }
        Commands::Presets => print_presets(&config),
    }
}

async fn run_deployment(config: &AppConfig, path: &Path, duration: Option<u64>) -> Result<()> {
    let json = tokio::fs::read_to_string(path).await?;
    let deployment = StudyDeployment::from_json(&json)?;
    info!(
        study_deployment_id = %deployment.study_deployment_id,
        tasks = deployment.tasks.len(),
        "Loaded study deployment"
    );

    let context = SensingContext::builder()
        .package(Arc::new(DevicePackage::new(config.simulation.clone())))
        .build();
    let controller = StudyDeploymentController::builder(deployment)
        .context(context)
        .config(config.controller.clone())
        .build()?;

    controller.initialize().await?;
    controller.resume().await?;
    info!("Sensing started, press Ctrl-C to stop");

    match duration {
        Some(secs) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    controller.stop().await?;
    info!(
        sampling_size = controller.sampling_size(),
        power_awareness = %controller.power_awareness_state(),
        "Sensing stopped"
    );
    Ok(())
}

fn print_presets(config: &AppConfig) -> Result<()> {
    let mut packages = SamplingPackageRegistry::new();
    packages.register(Arc::new(DevicePackage::new(config.simulation.clone())));

    let presets = BTreeMap::from([
        ("none", packages.none()),
        ("minimum", packages.minimum()),
        ("light", packages.light()),
        ("normal", packages.normal()),
    ]);
    println!("{}", serde_json::to_string_pretty(&presets)?);
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, configured: &str) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("sensing_runtime=debug,sensing=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    };

    // Data goes to stdout; logs go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
