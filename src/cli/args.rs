//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::LogLevel;
use crate::engine::FormatSet;

/// Parse a barcode format list ("ean13,qrcode", or "none")
fn parse_formats(s: &str) -> Result<FormatSet, String> {
    s.parse()
}

/// Parse and validate a frame rate (1-60 fps)
fn parse_fps(s: &str) -> Result<u32, String> {
    let fps: u32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid frame rate", s))?;
    if !(1..=60).contains(&fps) {
        return Err(format!("Frame rate must be between 1 and 60 fps, got {}", fps));
    }
    Ok(fps)
}

/// Image recognition and barcode scanning client
#[derive(Parser, Debug)]
#[command(name = "scan-relay")]
#[command(version, about = "Image recognition and barcode scanning client", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Pull the latest catalog from the server
    scan-relay sync

    # Look up a photo in the local database
    scan-relay search photo.jpg

    # Scan a folder of frames as if it were a camera
    scan-relay scan --source ./frames

    # Send frames for an online search on Enter
    scan-relay scan --source ./frames --manual")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Log level (overrides the config file and RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the local database from the server
    Sync,
    /// Print the number of images in the local database
    Count,
    /// List the image identifiers in the local database
    Info,
    /// Search an image in the local database
    Search {
        /// Image file to look up
        image: PathBuf,
    },
    /// Check whether an image shows a given record
    Match {
        /// Image file to check
        image: PathBuf,
        /// Record identifier
        uid: String,
    },
    /// Search an image online
    ApiSearch {
        /// Image file to look up
        image: PathBuf,
    },
    /// Decode a barcode in an image
    Decode {
        /// Image file to decode
        image: PathBuf,
        /// Barcode formats to look for
        #[arg(long, short, value_parser = parse_formats)]
        formats: Option<FormatSet>,
    },
    /// Scan camera frames continuously
    Scan {
        /// Directory of images replayed as camera frames
        #[arg(long, short)]
        source: Option<PathBuf>,
        /// Search online on Enter instead of scanning every frame offline
        #[arg(long)]
        manual: bool,
        /// Frames per second
        #[arg(long, value_parser = parse_fps)]
        fps: Option<u32>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
