//! Subcommand handlers.

pub mod config_cmd;
pub mod push;
pub mod run;
