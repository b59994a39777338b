//! worker-dispatch - run test requests on a pool of worker processes
//!
//! Each worker is a long-lived process that reads JSON test requests on
//! stdin and answers with JSON results on stdout. A per-worker executor
//! reconciles results, stderr output and process exits into exactly one
//! reported outcome per request.
//!
//! ## Usage
//!
//! ```bash
//! # Run requests on 8 workers
//! worker-dispatch run --requests requests.json --worker php --worker-arg worker.php -w 8
//!
//! # Show the requests and their wire encoding
//! worker-dispatch list --requests requests.yaml --encoded
//!
//! # Write a default configuration file
//! worker-dispatch config init
//! ```

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::Path;
use tracing::info;

mod cli;
mod config;
mod distributor;
mod executor;
mod ipc;
mod models;
mod output;
mod utils;

use cli::Args;
use config::env::{print_env_help, EnvConfig};
use config::AppConfig;
use executor::WorkerPool;
use models::load_requests;
use output::{write_summary_to_file, OutputFormat, ResultFormatter};
use utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();
    let (config, config_path) = AppConfig::discover(args.config.as_deref(), &env)?;

    // Initialize logging
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        config.log_level.parse().unwrap_or(LogLevel::Info)
    };
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            if !run_requests(run_args, config).await? {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_requests(list_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, &config, config_path.as_deref(), &env)?;
        }
    }

    Ok(())
}

/// Returns whether every request passed
async fn run_requests(args: cli::RunArgs, mut config: AppConfig) -> Result<bool> {
    if let Some(worker) = args.worker {
        config.worker.program = worker;
    }
    if !args.worker_args.is_empty() {
        config.worker.args = args.worker_args;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_restarts) = args.max_restarts {
        config.max_restarts = max_restarts;
    }
    if let Some(format) = args.format {
        config.format = format;
    }

    let format = OutputFormat::parse(&config.format)
        .ok_or_else(|| anyhow!("Unknown output format: {}", config.format))?;

    let requests = load_requests(&args.requests)?;
    info!(
        "Loaded {} request(s) from {}",
        requests.len(),
        args.requests.display()
    );

    let pool = WorkerPool::new(config.pool_config());
    let summary = pool.run(requests).await?;

    let mut formatter = ResultFormatter::new(format);
    if !std::io::stdout().is_terminal() {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_summary(&summary));

    if let Some(path) = args.output {
        write_summary_to_file(&path, &summary, OutputFormat::JsonPretty)?;
        info!("Summary saved to {}", path);
    }

    Ok(summary.is_all_passed())
}

fn list_requests(args: cli::ListArgs) -> Result<()> {
    let requests = load_requests(&args.requests)?;

    println!("\n{} request(s) in {}\n", requests.len(), args.requests.display());

    for request in &requests {
        if args.encoded {
            print!("{}", String::from_utf8_lossy(&request.encode()));
        } else {
            println!("  {:>5}  {:30} {}", request.id, request.class, request.name);
            println!("         {}", request.file);
        }
    }

    println!();
    Ok(())
}

fn manage_config(
    args: cli::ConfigArgs,
    config: &AppConfig,
    config_path: Option<&Path>,
    env: &EnvConfig,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show => {
            match config_path {
                Some(path) => println!("# Loaded from {}", path.display()),
                None => println!("# No config file found, using defaults"),
            }
            print!("{}", serde_yaml::to_string(config)?);

            if env.has_any() {
                println!();
                env.print_summary();
            }
        }

        cli::ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(config::default_config_path);
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }

            AppConfig::default().save(&path)?;
            println!("✓ Wrote default configuration to {}", path.display());
        }

        cli::ConfigAction::Env => {
            print_env_help();
        }
    }

    Ok(())
}
