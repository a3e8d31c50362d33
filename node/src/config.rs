//! Gateway configuration: defaults, optional config file, `IPFS_GATEWAY_*`
//! environment variables and command line flags, later sources winning.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use config::{Config, File as ConfigFile};
use ipfs_gateway_resolver::{ResolverConfig, DEFAULT_CLEANUP_DELAY, DEFAULT_NODE_URL};

const ENV_PREFIX: &str = "IPFS_GATEWAY";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Default)]
#[command(name = "ipfs-gateway")]
#[command(about = "HTTP gateway serving IPFS content and directory listings by CID")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port [default: 8000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// IPFS node RPC URL [default: http://ipfs:5001]
    #[arg(long)]
    pub node_url: Option<String>,

    /// Seconds a staged temp file is kept [default: 5]
    #[arg(long)]
    pub cleanup_delay_secs: Option<u64>,

    /// Directory for staged temp files [default: OS temp dir]
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Do not stage fetched files on disk
    #[arg(long)]
    pub no_stage: bool,

    /// Log filter, overridden by RUST_LOG [default: info]
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format [default: pretty]
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_value(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format {other:?}, expected \"pretty\" or \"json\""),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        };
        f.write_str(value)
    }
}

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    // HTTP
    pub host: String,
    pub port: u16,

    // IPFS node
    pub node_url: String,

    // Staging
    pub stage_files: bool,
    pub temp_dir: Option<PathBuf>,
    pub cleanup_delay: Duration,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            node_url: DEFAULT_NODE_URL.to_string(),
            stage_files: true,
            temp_dir: None,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl GatewayConfig {
    /// Load from the process environment and the file named on the command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = Self::from_sources(cli.config.as_deref(), None)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// `env` replaces the process environment when given.
    fn from_sources(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).source(env));

        let config = builder.build().context("failed to load gateway configuration")?;
        let defaults = Self::default();

        let log_format = match get_string_value(&config, &["log_format"]) {
            Some(value) => LogFormat::from_value(&value)?,
            None => defaults.log_format,
        };

        Ok(Self {
            host: get_string_value(&config, &["host"]).unwrap_or(defaults.host),
            port: get_string_value(&config, &["port"])
                .unwrap_or_else(|| defaults.port.to_string())
                .parse()
                .context("invalid port")?,
            node_url: get_string_value(&config, &["node_url"]).unwrap_or(defaults.node_url),
            stage_files: get_bool_value(&config, &["stage_files"], defaults.stage_files),
            temp_dir: get_string_value(&config, &["temp_dir"]).map(PathBuf::from),
            cleanup_delay: match get_string_value(&config, &["cleanup_delay_secs"]) {
                Some(value) => Duration::from_secs(
                    value.parse().context("invalid cleanup_delay_secs")?,
                ),
                None => defaults.cleanup_delay,
            },
            log_level: get_string_value(&config, &["log_level"]).unwrap_or(defaults.log_level),
            log_format,
        })
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(node_url) = &cli.node_url {
            self.node_url = node_url.clone();
        }
        if let Some(secs) = cli.cleanup_delay_secs {
            self.cleanup_delay = Duration::from_secs(secs);
        }
        if let Some(dir) = &cli.temp_dir {
            self.temp_dir = Some(dir.clone());
        }
        if cli.no_stage {
            self.stage_files = false;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        if let Some(format) = cli.log_format {
            self.log_format = format;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.node_url.trim().is_empty() {
            bail!("node_url must not be empty");
        }
        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                bail!("temp_dir {} is not a directory", dir.display());
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            stage_files: self.stage_files,
            temp_dir: self.temp_dir.clone(),
            cleanup_delay: self.cleanup_delay,
        }
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn get_bool_value(config: &Config, keys: &[&str], default: bool) -> bool {
    for key in keys {
        if let Ok(value) = config.get_bool(key) {
            return value;
        }
        if let Ok(raw) = config.get_string(key) {
            if let Ok(parsed) = raw.parse::<bool>() {
                return parsed;
            }
        }
    }
    default
}
