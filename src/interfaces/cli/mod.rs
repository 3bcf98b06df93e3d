//! CLI interface module
//!
//! Operator commands run directly against the database; no server needs to
//! be running.

pub mod commands;

use std::fmt;

use crate::cli::{Commands, ConfigCommands, DefinitionCommands, QueueCommands};
use crate::config::StaticConfig;
use crate::storage::StorageFactory;
use commands::{config_management, definition, queue};

#[derive(Debug)]
pub enum CliError {
    StorageError(String),
    ParseError(String),
    CommandError(String),
}

impl CliError {
    /// Format as simple output
    pub fn format_simple(&self) -> String {
        match self {
            CliError::StorageError(msg) => format!("Storage error: {}", msg),
            CliError::ParseError(msg) => format!("Parse error: {}", msg),
            CliError::CommandError(msg) => format!("Command error: {}", msg),
        }
    }

    /// Format as colored output
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        match self {
            CliError::StorageError(msg) => {
                format!("{} {}", "Storage error:".red().bold(), msg.white())
            }
            CliError::ParseError(msg) => {
                format!("{} {}", "Parse error:".yellow().bold(), msg.white())
            }
            CliError::CommandError(msg) => {
                format!("{} {}", "Command error:".red().bold(), msg.white())
            }
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for CliError {}

impl From<crate::errors::ClicktrailError> for CliError {
    fn from(err: crate::errors::ClicktrailError) -> Self {
        use crate::errors::ClicktrailError;
        match err {
            ClicktrailError::Validation(_) | ClicktrailError::Config(_) => {
                CliError::ParseError(err.message().to_string())
            }
            ClicktrailError::NotFound(_) => CliError::CommandError(err.message().to_string()),
            _ => CliError::StorageError(err.to_string()),
        }
    }
}

/// Run a CLI command from clap-parsed input
pub async fn run_cli_command(cmd: Commands, config: &StaticConfig) -> Result<(), CliError> {
    match cmd {
        // 配置相关命令不需要数据库
        Commands::Config { action } => match action {
            ConfigCommands::Generate { output_path, force } => {
                config_management::config_generate(output_path, force).await
            }
            ConfigCommands::Show => config_management::config_show(config),
        },
        Commands::Definition { action } => {
            let storage = StorageFactory::create(&config.database).await?;
            match action {
                DefinitionCommands::Create {
                    destination,
                    source,
                    medium,
                    campaign,
                    content,
                    term,
                } => {
                    let args = definition::NewDefinitionArgs {
                        destination,
                        source,
                        medium,
                        campaign,
                        content,
                        term,
                    };
                    definition::create_definition(&storage, &config.tracking, args).await
                }
                DefinitionCommands::Show { id } => {
                    definition::show_definition(&storage, &id).await
                }
                DefinitionCommands::Deactivate { id } => {
                    definition::deactivate_definition(&storage, &id).await
                }
            }
        }
        Commands::Queue { action } => {
            let storage = StorageFactory::create(&config.database).await?;
            match action {
                QueueCommands::Stats => queue::queue_stats(&storage).await,
                QueueCommands::Requeue { id } => queue::requeue_job(&storage, id).await,
                QueueCommands::Purge { older_than_days } => {
                    queue::purge_jobs(&storage, older_than_days).await
                }
            }
        }
        Commands::Serve => Err(CliError::CommandError(
            "serve runs the server and is not a CLI command".to_string(),
        )),
    }
}
