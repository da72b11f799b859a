//! Backs `aminer-rs run` (and the bare default invocation): loads and
//! validates the config, builds the engine, and runs it to completion.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::parse::{load_config, ConfigError};
use crate::pipeline::{Engine, EngineBuildError, EngineError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build pipeline: {0}")]
    Build(#[from] EngineBuildError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: no configuration file found.");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/aminer-rs/config.yml");
            eprintln!("  /etc/aminer-rs/config.yml");
            eprintln!("\nUse --config <path> to specify one, or run 'aminer-rs config init' to generate a starter config.");
            std::process::exit(1);
        }
    };

    run_pipeline(&config_path).await.map_err(|e| e.into())
}

async fn run_pipeline(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "loading configuration");
    let config = load_config(config_path)?;

    info!(
        sources = config.input.sources.len(),
        detectors = config.analysis.len(),
        sinks = config.event_handlers.len(),
        "configuration validated, building pipeline"
    );
    let (engine, atom_source) = Engine::build(&config)?;

    info!("pipeline built, starting dispatch loop");
    engine.run(atom_source).await?;

    info!("shutdown complete");
    Ok(())
}
