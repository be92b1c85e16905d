//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file and then to built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// FormPulse - collect form responses and watch analytics update live
///
/// Serves a JSON API for forms and responses, plus a Server-Sent Events
/// stream per form that pushes a fresh analytics snapshot every time a
/// response arrives.
///
/// Examples:
///   formpulse
///   formpulse --port 9000 --origin https://dashboard.example.com
///   formpulse --data-file ./formpulse.json --seed
///   formpulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, value_name = "ADDR", env = "FORMPULSE_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT", env = "PORT")]
    pub port: Option<u16>,

    /// Origin allowed to call the API from a browser
    #[arg(long, value_name = "URL", env = "ORIGIN")]
    pub origin: Option<String>,

    /// JSON file to persist forms and responses to
    ///
    /// If not specified, data lives in memory only and is lost on exit
    #[arg(short, long, value_name = "FILE", env = "FORMPULSE_DATA")]
    pub data_file: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .formpulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Create a demo form with random responses on startup
    #[arg(long)]
    pub seed: bool,

    /// Number of random responses the demo form gets
    #[arg(long, value_name = "COUNT")]
    pub seed_responses: Option<usize>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .formpulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.port == Some(0) {
            return Err("Port must be between 1 and 65535".to_string());
        }

        if let Some(ref origin) = self.origin {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err("Origin must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.seed_responses == Some(0) {
            return Err("Seed responses must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
