//! Configuration management for the stratum mining client
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON) with validation and defaults.

use crate::stratum::client::ClientConfig;
use crate::utils::parse_pool_address;
use crate::worker::WorkerPoolConfig;
use crate::{Error, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable single-line output
    Plain,
    /// One JSON object per event
    Json,
}

/// Proof-of-work digest the pool verifies shares with
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowAlgorithm {
    /// Eaglesong (CKB)
    Eaglesong,
    /// Blake2s-256
    Blake2s,
}

/// Complete configuration for the mining client
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "stratum-mining-client",
    version = env!("CARGO_PKG_VERSION"),
    about = "Stratum proof-of-work mining client",
    long_about = "Connects to a stratum pool, searches nonces on all CPU cores and submits shares that meet the pool target"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Pool address: host:port, stratum+tcp://host:port or tcp://host:port
    #[arg(short = 'o', long, env = "STRATUM_URL", default_value = "ckb.uupool.cn:10861")]
    #[serde(default = "default_url")]
    pub url: String,

    /// Worker name, usually `<account>.<rig>`
    #[arg(short = 'u', long, env = "STRATUM_USERNAME")]
    pub username: Option<String>,

    /// Worker password
    #[arg(short = 'x', long, env = "STRATUM_PASSWORD", default_value = "x")]
    #[serde(default = "default_password")]
    pub password: String,

    /// Number of mining threads (0 = number of CPUs)
    #[arg(short = 't', long, env = "MINER_THREADS", default_value = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Proof-of-work digest
    #[arg(short = 'a', long, env = "MINER_ALGORITHM", default_value = "eaglesong")]
    #[serde(default = "default_algorithm")]
    pub algorithm: PowAlgorithm,

    /// Hash rate reporting interval
    #[arg(short = 's', long, default_value = "10s")]
    #[serde(default = "default_hashrate_interval")]
    pub hashrate_interval: String,

    /// Worker backoff while no job is available
    #[arg(long, default_value = "5s")]
    #[serde(default = "default_job_wait")]
    pub job_wait: String,

    /// Log level
    #[arg(short = 'l', long, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, default_value = "plain")]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(short = 'f', long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Parse the command line and merge the config file if one is given
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = config.config_file.clone() {
            let file_config = Self::load_from_file(&config_file).await?;
            config = config.merge_with_file(file_config);
        }

        if !config.print_config {
            config.validate()?;
        }
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config.
    ///
    /// A value given on the command line or in the environment wins; file
    /// values replace only what is still at its default.
    fn merge_with_file(mut self, file_config: Self) -> Self {
        if self.username.is_none() {
            self.username = file_config.username;
        }
        if self.log_file.is_none() {
            self.log_file = file_config.log_file;
        }

        if self.url == default_url() {
            self.url = file_config.url;
        }
        if self.password == default_password() {
            self.password = file_config.password;
        }
        if self.threads == 0 {
            self.threads = file_config.threads;
        }
        if self.algorithm == default_algorithm() {
            self.algorithm = file_config.algorithm;
        }
        if self.hashrate_interval == default_hashrate_interval() {
            self.hashrate_interval = file_config.hashrate_interval;
        }
        if self.job_wait == default_job_wait() {
            self.job_wait = file_config.job_wait;
        }
        if self.log_level == default_log_level() {
            self.log_level = file_config.log_level;
        }
        if self.log_format == default_log_format() {
            self.log_format = file_config.log_format;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.username()?;
        self.pool_address()?;

        if self.hashrate_interval_duration()?.is_zero() {
            return Err(Error::config("hashrate interval must be greater than 0"));
        }
        if self.job_wait_duration()?.is_zero() {
            return Err(Error::config("job wait must be greater than 0"));
        }

        Ok(())
    }

    /// Worker name; must be present and non-empty
    pub fn username(&self) -> Result<&str> {
        match self.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Error::config("username is required (--username or STRATUM_USERNAME)")),
        }
    }

    /// Pool address as `host:port`
    pub fn pool_address(&self) -> Result<String> {
        parse_pool_address(&self.url)
    }

    /// Get parsed hash rate reporting interval
    pub fn hashrate_interval_duration(&self) -> Result<Duration> {
        parse_duration("hashrate interval", &self.hashrate_interval)
    }

    /// Get parsed worker backoff
    pub fn job_wait_duration(&self) -> Result<Duration> {
        parse_duration("job wait", &self.job_wait)
    }

    /// Settings for the pool session
    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig::new(
            self.pool_address()?,
            self.username()?,
            self.password.clone(),
        ))
    }

    /// Settings for the worker pool
    pub fn worker_pool_config(&self) -> Result<WorkerPoolConfig> {
        Ok(WorkerPoolConfig {
            threads: self.threads,
            job_wait: self.job_wait_duration()?,
        })
    }

    /// Configuration as YAML, with the password masked
    pub fn to_yaml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.password = "*".repeat(shown.password.len());
        Ok(serde_yaml::to_string(&shown)?)
    }
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("invalid {} {:?}: {}", name, value, e)))
}

// Default value functions for serde
fn default_url() -> String { "ckb.uupool.cn:10861".to_string() }
fn default_password() -> String { "x".to_string() }
fn default_algorithm() -> PowAlgorithm { PowAlgorithm::Eaglesong }
fn default_hashrate_interval() -> String { "10s".to_string() }
fn default_job_wait() -> String { "5s".to_string() }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Plain }

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["stratum-mining-client"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = parse(&["-u", "alice.rig1"]);

        assert_eq!(config.url, "ckb.uupool.cn:10861");
        assert_eq!(config.password, "x");
        assert_eq!(config.threads, 0);
        assert_eq!(config.algorithm, PowAlgorithm::Eaglesong);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert_eq!(config.hashrate_interval_duration().unwrap(), Duration::from_secs(10));
        assert_eq!(config.job_wait_duration().unwrap(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_flags() {
        let config = parse(&[
            "-o", "stratum+tcp://pool.example.com:3333",
            "-u", "bob.rig2",
            "-x", "secret",
            "-t", "3",
            "-s", "30s",
            "-l", "debug",
            "-a", "blake2s",
        ]);

        assert_eq!(config.pool_address().unwrap(), "pool.example.com:3333");
        assert_eq!(config.username().unwrap(), "bob.rig2");
        assert_eq!(config.password, "secret");
        assert_eq!(config.worker_pool_config().unwrap().threads, 3);
        assert_eq!(config.hashrate_interval_duration().unwrap(), Duration::from_secs(30));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.algorithm, PowAlgorithm::Blake2s);

        let client = config.client_config().unwrap();
        assert_eq!(client.address, "pool.example.com:3333");
        assert_eq!(client.username, "bob.rig2");
    }

    #[test]
    fn test_validation() {
        assert_matches!(parse(&[]).validate(), Err(Error::Config { .. }));
        assert_matches!(parse(&["-u", "  "]).validate(), Err(Error::Config { .. }));
        assert_matches!(parse(&["-u", "a", "-s", "0s"]).validate(), Err(Error::Config { .. }));
        assert_matches!(parse(&["-u", "a", "-s", "soon"]).validate(), Err(Error::Config { .. }));
        assert_matches!(parse(&["-u", "a", "-o", "no-port"]).validate(), Err(Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = r#"
url: "stratum+tcp://pool.example.com:3333"
username: "carol.rig3"
threads: 4
hashrate_interval: "1m"
log_format: json
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.url, "stratum+tcp://pool.example.com:3333");
        assert_eq!(config.username.as_deref(), Some("carol.rig3"));
        assert_eq!(config.threads, 4);
        assert_eq!(config.hashrate_interval_duration().unwrap(), Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.password, "x");
        assert_eq!(config.job_wait, "5s");
    }

    #[tokio::test]
    async fn test_config_from_json() {
        let mut temp_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(temp_file, r#"{{"username": "dave.rig4", "password": "pw"}}"#).unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.username.as_deref(), Some("dave.rig4"));
        assert_eq!(config.password, "pw");
        assert_eq!(config.url, "ckb.uupool.cn:10861");
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let cli = parse(&["-u", "cli.rig", "-t", "2"]);
        let file: Config = serde_yaml::from_str(
            "username: file.rig\nthreads: 8\nurl: tcp://file.example.com:1\npassword: filepw\n",
        )
        .unwrap();

        let merged = cli.merge_with_file(file);
        assert_eq!(merged.username.as_deref(), Some("cli.rig"));
        assert_eq!(merged.threads, 2);
        assert_eq!(merged.url, "tcp://file.example.com:1");
        assert_eq!(merged.password, "filepw");
    }

    #[test]
    fn test_yaml_masks_password() {
        let config = parse(&["-u", "alice.rig1", "-x", "hunter2"]);
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("alice.rig1"));
        assert!(!yaml.contains("hunter2"));
        assert!(!yaml.contains("print_config"));
    }
}
