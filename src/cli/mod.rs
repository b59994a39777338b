//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dispatch test requests across a pool of worker processes
#[derive(Parser, Debug)]
#[command(name = "worker-dispatch")]
#[command(version)]
#[command(about = "Run test requests on a pool of long-lived worker processes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test requests on worker processes
    Run(RunArgs),

    /// List the requests in a request file
    List(ListArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Request file (JSON or YAML list of requests)
    #[arg(short, long)]
    pub requests: PathBuf,

    /// Worker program (overrides config)
    #[arg(long)]
    pub worker: Option<String>,

    /// Argument passed to the worker program (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Number of worker processes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Replacement workers a slot may start after a crash
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Save the summary as JSON to this file
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Request file (JSON or YAML list of requests)
    #[arg(short, long)]
    pub requests: PathBuf,

    /// Show the encoded form sent to workers
    #[arg(short, long)]
    pub encoded: bool,
}

/// Arguments for configuration management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Destination (defaults to ~/.config/worker-dispatch/config.yaml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List supported environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::parse_from([
            "worker-dispatch",
            "run",
            "--requests",
            "requests.json",
            "--worker",
            "php",
            "--worker-arg",
            "worker.php",
            "--worker-arg",
            "--bootstrap=tests/bootstrap.php",
            "-w",
            "8",
        ]);

        match args.command {
            Command::Run(run) => {
                assert_eq!(run.requests, PathBuf::from("requests.json"));
                assert_eq!(run.worker.as_deref(), Some("php"));
                assert_eq!(
                    run.worker_args,
                    vec!["worker.php", "--bootstrap=tests/bootstrap.php"]
                );
                assert_eq!(run.workers, Some(8));
                assert!(run.format.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let args = Args::parse_from(["worker-dispatch", "config", "show", "-v", "-c", "cfg.yaml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("cfg.yaml")));
        assert!(matches!(
            args.command,
            Command::Config(ConfigArgs {
                action: ConfigAction::Show
            })
        ));
    }
}
