//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// singlepeer - single-instance coordination for applications
#[derive(Parser, Debug)]
#[command(
    name = "sp",
    about = "Single-instance coordination and message relay between launches",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the channel name derived from an application id
    Channel {
        /// Application identifier
        application_id: String,
    },

    /// Report whether an instance of the application is already running
    Status {
        /// Application identifier
        application_id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Become the primary and print relayed messages, or forward to the running one
    Run {
        /// Application identifier
        application_id: String,

        /// Message to forward when another instance is already running
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Relay a message to the running primary
    Send {
        /// Application identifier
        application_id: String,

        /// Message text (may be empty)
        text: String,

        /// Acknowledgment timeout in milliseconds (default from config)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

/// Output format for status
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Where the binary writes its log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("singlepeer")
        .join("logs")
        .join("singlepeer.log")
}
