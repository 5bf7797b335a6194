//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    api_search, count, ctrlc_received, decode, handle_config_action, info, match_uid,
    open_scanner, scan, search, setup_ctrlc_handler, sync,
};
pub use enums::LogLevel;
