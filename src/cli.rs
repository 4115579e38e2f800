//! Command-line interface for stockhand.
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Voice-driven inventory assistant backend
#[derive(Parser, Debug)]
#[command(
    name = "stockhand",
    version,
    about = "Voice-driven inventory assistant backend"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Bind address override, e.g. 0.0.0.0:8090
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration file and exit
    CheckConfig,
}
