//! ndjson2sqlite - Parallel NDJSON Log to SQLite Converter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use ndjson2sqlite::config::{parse_table_spec, CliArgs, PipelineConfig};
use ndjson2sqlite::mapper::JsonColumnMapper;
use ndjson2sqlite::pipeline::Pipeline;
use ndjson2sqlite::progress::{print_header, print_summary};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = PipelineConfig::from_args(&args).context("Invalid configuration")?;
    let table = parse_table_spec(&args.table, &args.columns).context("Invalid table spec")?;

    if config.show_progress {
        print_header(
            &config.input.display().to_string(),
            config.readers,
            &config.output.display().to_string(),
        );
    }

    let mapper = Arc::new(JsonColumnMapper::new(table.clone()));
    let skip_integration = config.skip_integration;
    let show_progress = config.show_progress;

    let report = Pipeline::new(config, vec![table], mapper)
        .run()
        .context("Pipeline failed")?;

    if skip_integration {
        println!("Produced {} shard database(s):", report.shard_paths.len());
        for shard in &report.shard_paths {
            println!("  {}", shard.display());
        }
    } else if show_progress {
        print_summary(&report);
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
