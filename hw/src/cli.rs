//! CLI argument parsing for hexwindow

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hw")]
#[command(author, version, about = "Windowed binary file editor", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Byte range of the file to load
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct WindowArgs {
    /// File offset where the window starts
    #[arg(short, long, default_value = "0")]
    pub start: u64,

    /// Window length in bytes (0 = to end of file)
    #[arg(short = 'n', long, default_value = "0")]
    pub length: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show window and file metadata
    Info {
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Hex dump of a window
    Dump {
        #[arg(required = true)]
        file: PathBuf,

        #[command(flatten)]
        window: WindowArgs,

        /// Bytes per row
        #[arg(short, long, default_value = "16")]
        width: usize,
    },

    /// Set one byte and save
    Set {
        #[arg(required = true)]
        file: PathBuf,

        /// Window-relative offset (decimal or 0x-prefixed hex)
        #[arg(required = true, value_parser = parse_number)]
        offset: u64,

        /// New byte value (decimal or 0x-prefixed hex)
        #[arg(required = true, value_parser = parse_byte)]
        value: u8,

        #[command(flatten)]
        window: WindowArgs,

        /// Write to this path instead of in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two files byte by byte
    Diff {
        #[arg(required = true)]
        left: PathBuf,

        #[arg(required = true)]
        right: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Search a file with the configured patterns
    Find {
        #[arg(required = true)]
        file: PathBuf,

        /// Patterns file (overrides config)
        #[arg(short, long)]
        patterns: Option<PathBuf>,
    },
}

/// Output format for diff results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Parse a decimal or `0x` hex number
pub fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("Invalid number '{}': {}", s, e))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let value = parse_number(s)?;
    u8::try_from(value).map_err(|_| format!("Byte value out of range: {}", s))
}
