mod cli;
mod commands;
mod error;

use clap::Parser;
use republish_config::{LogFormat, LoggingSettings, Settings};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Settings are loaded before tracing so the file can choose the format;
    // a load error is reported after tracing is up.
    let settings = republish_config::load_settings(cli.global.config.as_deref());
    let defaults = LoggingSettings::default();
    let logging = settings.as_ref().map_or(&defaults, |s| &s.logging);
    let format = cli.global.log_format.map_or(logging.format, LogFormat::from);
    init_tracing(cli.global.verbose, &logging.level, format);

    if let Err(err) = run(cli, settings.map_err(CliError::from)).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, level: &str, format: LogFormat) {
    let default = match verbosity {
        0 => level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli, settings: Result<Settings, CliError>) -> Result<(), CliError> {
    match cli.command {
        // Path lookup works even when the file does not parse.
        Command::Config(args) => commands::config_cmd::handle(&args, settings),
        Command::PushSensors(args) => commands::push::handle(&args, &settings?).await,
        Command::Run => commands::run::handle(&settings?).await,
    }
}
