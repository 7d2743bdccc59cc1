//! Command-line surface of the cross-repository PR sync tool.

pub mod cli_args;
pub mod cli_types;
pub mod commands;

pub use cli_args::{Cli, CliCommand};
pub use cli_types::CliDispatchMode;
pub use commands::{execute_command, run_cli};
