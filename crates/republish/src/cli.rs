//! Clap derive structures for the `republish` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use republish_config::LogFormat;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// republish -- aggregate sensor telemetry into per-device MQTT records
#[derive(Debug, Parser)]
#[command(
    name = "republish",
    version,
    about = "Aggregate sensor telemetry and republish per-device records over MQTT",
    long_about = "Subscribes to raw per-attribute sensor topics, keeps the latest value of\n\
        every attribute per device, and republishes one named JSON record per device\n\
        when something changed or the record went stale.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "REPUBLISH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format (overrides the config file)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormatArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable text
    Pretty,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the broker and run until interrupted
    Run,

    /// Validate a sensor name table and publish it as a config update
    #[command(name = "push-sensors")]
    PushSensors(PushSensorsArgs),

    /// Inspect the resolved configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct PushSensorsArgs {
    /// JSON file: {"<device_id>": {"display_name": ..., "machine_name": ...}}
    pub file: PathBuf,

    /// Validate only; do not connect
    #[arg(long)]
    pub dry_run: bool,

    /// Seconds to wait for the broker connection
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML (password redacted)
    Show,
    /// Print the default configuration file path
    Path,
}
