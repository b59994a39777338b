//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "WORKER_DISPATCH";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Worker count from WORKER_DISPATCH_WORKERS
    pub workers: Option<usize>,
    /// Worker program from WORKER_DISPATCH_WORKER
    pub worker: Option<String>,
    /// Restart limit from WORKER_DISPATCH_MAX_RESTARTS
    pub max_restarts: Option<u32>,
    /// Output format from WORKER_DISPATCH_FORMAT
    pub format: Option<String>,
    /// Log level from WORKER_DISPATCH_LOG
    pub log_level: Option<String>,
    /// Config file from WORKER_DISPATCH_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            workers: get_env_parse("WORKERS"),
            worker: get_env("WORKER"),
            max_restarts: get_env_parse("MAX_RESTARTS"),
            format: get_env("FORMAT"),
            log_level: get_env("LOG"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.workers.is_some()
            || self.worker.is_some()
            || self.max_restarts.is_some()
            || self.format.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_WORKERS:      {:?}", ENV_PREFIX, self.workers);
        println!("  {}_WORKER:       {:?}", ENV_PREFIX, self.worker);
        println!("  {}_MAX_RESTARTS: {:?}", ENV_PREFIX, self.max_restarts);
        println!("  {}_FORMAT:       {:?}", ENV_PREFIX, self.format);
        println!("  {}_LOG:          {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Print all WORKER_DISPATCH environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_WORKERS       Number of worker processes");
    println!("  {ENV_PREFIX}_WORKER        Worker program to launch");
    println!("  {ENV_PREFIX}_MAX_RESTARTS  Replacement workers per slot after a crash");
    println!("  {ENV_PREFIX}_FORMAT        Output format (table, json, json-pretty, csv, summary)");
    println!("  {ENV_PREFIX}_LOG           Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_WORKERS=8");
    println!("  export {ENV_PREFIX}_WORKER=./bin/test-worker");
    println!("  worker-dispatch run --requests requests.json");
}
