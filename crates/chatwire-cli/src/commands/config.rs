use std::path::Path;

use clap::{Parser, Subcommand};
use chatwire::config::Config;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    #[clap(about = "Print the effective configuration")]
    Show,

    #[clap(about = "Print which config file is in use")]
    Path,

    #[clap(about = "Check the configuration for errors")]
    Validate,
}

impl ConfigCommand {
    pub fn execute(&self, config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            ConfigSubcommand::Show => Self::show(config_path, format),
            ConfigSubcommand::Path => Self::path(config_path, format),
            ConfigSubcommand::Validate => Self::validate(config_path, format),
        }
    }

    fn show(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            OutputFormat::Table => print!("{}", config.to_toml()?),
        }

        Ok(())
    }

    fn path(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let found = Config::find_path(config_path);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "path": found.as_ref().map(|p| p.display().to_string()),
                    "searched": Config::default_paths()
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => match found {
                Some(path) => println!("{}", path.display()),
                None => {
                    println!("No config file found. Searched:");
                    for path in Config::default_paths() {
                        println!("  {}", path.display());
                    }
                }
            },
        }

        Ok(())
    }

    fn validate(config_path: Option<&Path>, format: OutputFormat) -> CliResult<()> {
        let config = Config::load(config_path)?;
        let result = config.validate().and_then(|_| config.resolve_all().map(|_| ()));

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": result.is_ok(),
                    "error": result.as_ref().err().map(|e| e.to_string()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if result.is_ok() {
                    println!("Configuration is valid.");
                }
            }
        }

        result?;
        Ok(())
    }
}
