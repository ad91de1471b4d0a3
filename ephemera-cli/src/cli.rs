//! CLI argument parsing using clap derive API
//!
//! Purely declarative. The suite argument is parsed leniently: an unknown
//! value falls back to `all` and the caller logs the returned warning.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use ephemera_core::types::PhaseName;

/// ephemera -- build, run and tear down test phases in disposable containers.
#[derive(Parser, Debug)]
#[command(name = "ephemera", version, about, long_about = None)]
pub struct Cli {
    /// Test suite to run: unit, integration, browser or all (default).
    pub suite: Option<String>,

    /// Path to the configuration file (default: ./ephemera.toml if present).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Omit workload log bodies from the text report.
    #[arg(long)]
    pub no_logs: bool,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Which phases to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    /// Exactly one phase.
    Single(PhaseName),
    /// Every phase in fixed order.
    All,
}

impl Suite {
    /// Parses the positional argument case-insensitively.
    ///
    /// Returns the selection and, for unrecognised input, a warning message.
    pub fn from_arg(arg: Option<&str>) -> (Self, Option<String>) {
        let Some(raw) = arg else {
            return (Self::All, None);
        };
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized == "all" {
            return (Self::All, None);
        }
        match normalized.parse::<PhaseName>() {
            Ok(name) => (Self::Single(name), None),
            Err(_) => (
                Self::All,
                Some(format!(
                    "unknown suite '{raw}', expected unit, integration, browser or all; running all"
                )),
            ),
        }
    }

    /// Phase names in execution order.
    pub fn phases(&self) -> Vec<PhaseName> {
        match self {
            Self::Single(name) => vec![*name],
            Self::All => PhaseName::ALL.to_vec(),
        }
    }
}
