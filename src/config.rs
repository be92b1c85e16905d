//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.formpulse.toml` files.

use crate::seed::DEFAULT_SEED_RESPONSES;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".formpulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Demo data settings.
    #[serde(default)]
    pub seed: SeedConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origin allowed to make cross-origin requests (the dashboard).
    #[serde(default = "default_origin")]
    pub allowed_origin: String,

    /// Maximum accepted request body size.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Interval between keep-alive comments on analytics streams.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: default_origin(),
            body_limit_bytes: default_body_limit(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_body_limit() -> usize {
    1024 * 1024 // 1MB
}

fn default_keep_alive() -> u64 {
    15
}

/// Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON file to persist forms and responses to. Memory only when unset.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
}

/// Demo data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Create the demo form when the server starts.
    #[serde(default)]
    pub on_startup: bool,

    /// Number of random responses to generate.
    #[serde(default = "default_seed_responses")]
    pub responses: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            on_startup: false,
            responses: default_seed_responses(),
        }
    }
}

fn default_seed_responses() -> usize {
    DEFAULT_SEED_RESPONSES
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(ref origin) = args.origin {
            self.server.allowed_origin = origin.clone();
        }

        if let Some(ref data_file) = args.data_file {
            self.store.data_file = Some(data_file.clone());
        }

        // Flags always override
        if args.seed {
            self.seed.on_startup = true;
        }
        if let Some(responses) = args.seed_responses {
            self.seed.responses = responses;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
