//! Config subcommand handlers.

use republish_config::Settings;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, settings: Result<Settings, CliError>) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let text = settings?.redacted().to_toml()?;
            print!("{text}");
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", republish_config::config_path().display());
            Ok(())
        }
    }
}
