use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Antigravity quota monitor")]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(short = 'i', long, global = true)]
    pub interval: Option<u64>,

    /// Substring of the language server executable name
    #[arg(long, global = true)]
    pub process_name: Option<String>,

    /// Initially selected model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch quota once and print it
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Poll continuously and print every update
    Watch {
        /// Print one JSON object per event
        #[arg(long)]
        json: bool,
    },
    /// Show what discovery finds (pid, token, ports) without fetching
    Locate,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run (`status` when none given)
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Status { json: false })
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between scheduled poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Timeout for a single GetUserStatus request (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Timeout for each external process-inspection command (milliseconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Case-sensitive substring matched against executable names
    #[serde(default = "default_process_name")]
    pub process_name: String,

    /// Model selected until the server reports an active model
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_command_timeout() -> u64 {
    5000
}

fn default_process_name() -> String {
    "language_server".to_string()
}

fn default_model() -> String {
    "Gemini 3 Pro (High)".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_ms: default_request_timeout(),
            command_timeout_ms: default_command_timeout(),
            process_name: default_process_name(),
            default_model: default_model(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read_file(p);
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("agquota/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/agquota/config.toml")),
            dirs::home_dir().map(|p| p.join(".agquota.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::read_file(path);
            }
        }

        Ok(Self::default())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(interval) = cli.interval {
            self.poll_interval_secs = interval;
        }
        if let Some(name) = &cli.process_name {
            self.process_name = name.clone();
        }
        if let Some(model) = &cli.model {
            self.default_model = model.clone();
        }
    }

    /// Validate and normalize settings values (clamps intervals and timeouts)
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL_SECS: u64 = 1;
        const MIN_TIMEOUT_MS: u64 = 100;

        self.poll_interval_secs = self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS);
        self.request_timeout_ms = self.request_timeout_ms.max(MIN_TIMEOUT_MS);
        self.command_timeout_ms = self.command_timeout_ms.max(MIN_TIMEOUT_MS);
        if self.process_name.trim().is_empty() {
            self.process_name = default_process_name();
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
