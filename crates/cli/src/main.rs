mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use stockroom_infra::StockroomConfig;

use crate::cli::Cli;

fn load_config(cli: &Cli) -> Result<StockroomConfig> {
    let env = |key: &str| std::env::var(key).ok();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| StockroomConfig::config_path_with(env));
    let mut config = StockroomConfig::load_with(&path, env)
        .with_context(|| format!("failed to load config from {}", path.display()))?;

    // Flags win over env and file.
    if let Some(data) = &cli.data {
        config.storage.data_file = data.clone();
    }
    if let Some(store) = cli.store {
        config.default_store = Some(store);
    }
    if let Some(operator) = &cli.operator {
        config.operator.name = operator.clone();
    }
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "info".to_string(),
        2 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    stockroom_observability::init(&config.logging.level, config.logging.format);
    tracing::debug!(data_file = %config.storage.data_file.display(), "starting");

    commands::run(cli.command, &config)
}
