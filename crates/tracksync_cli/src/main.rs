mod cli;
mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Context;
use tracksync_core::config::ConfigManager;
use tracksync_core::logging::{init_tracing, LogLevel};

const DEFAULT_CONFIG: &str = "tracksync.toml";

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut config = ConfigManager::new(config_path);
    config.load_or_create()?;

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        config.settings().logging.level
    };
    init_tracing(level);

    let mut ctx = Context::new(config);

    match cli.command {
        Commands::Tracks { file, json } => ctx.tracks(&file, json),
        Commands::Offset {
            reference,
            source,
            reference_track,
            source_track,
            seed,
            parallel,
            json,
        } => ctx.offset(
            &reference,
            &source,
            reference_track,
            source_track,
            seed,
            parallel,
            json,
        ),
        Commands::Mux {
            reference,
            source,
            reference_track,
            source_track,
            offset,
            seed,
            force,
            output_dir,
        } => ctx.mux(
            &reference,
            &source,
            reference_track,
            source_track,
            offset,
            seed,
            force,
            output_dir,
        ),
        Commands::Extract {
            file,
            track,
            output_dir,
        } => ctx.extract(&file, track, output_dir),
        Commands::CheckTools { json } => ctx.check_tools(json),
        Commands::Config { tool_paths } => ctx.config(tool_paths),
    }
}
