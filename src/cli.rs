//! Command-line interface definitions using clap

use clap::{Parser, Subcommand};

/// clicktrail - first-party click-to-conversion attribution
#[derive(Parser)]
#[command(name = "clicktrail")]
#[command(version)]
#[command(about = "First-party click-to-conversion attribution service", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file (default: config.toml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default when no command is given)
    Serve,

    /// Manage tracking definitions
    Definition {
        #[command(subcommand)]
        action: DefinitionCommands,
    },

    /// Inspect and maintain the report queue
    Queue {
        #[command(subcommand)]
        action: QueueCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum DefinitionCommands {
    /// Register a new tracking definition and print its identifier
    Create {
        /// Destination URL, absolute or relative to tracking.site_url
        #[arg(long)]
        destination: String,

        #[arg(long)]
        source: String,

        #[arg(long)]
        medium: String,

        #[arg(long)]
        campaign: String,

        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        term: Option<String>,
    },

    /// Show a tracking definition with its click and conversion counts
    Show {
        /// 64-character tracking identifier
        id: String,
    },

    /// Stop a tracking definition from accepting clicks
    Deactivate {
        /// 64-character tracking identifier
        id: String,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Count jobs per status
    Stats,

    /// Put a failed job back into the queue with its attempts reset
    Requeue {
        /// Job id
        id: i64,
    },

    /// Delete finished (done / failed) jobs
    Purge {
        /// Only jobs last updated more than this many days ago
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate example configuration file
    Generate {
        /// Output path (default: config.example.toml)
        output_path: Option<String>,

        /// Force overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration (file + CT__* environment)
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_means_serve() {
        let cli = Cli::try_parse_from(["clicktrail"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["clicktrail", "queue", "stats", "-c", "/etc/ct.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/ct.toml"));
        assert!(matches!(
            cli.command,
            Some(Commands::Queue {
                action: QueueCommands::Stats
            })
        ));
    }

    #[test]
    fn test_definition_create_requires_dimensions() {
        assert!(
            Cli::try_parse_from(["clicktrail", "definition", "create", "--destination", "/a"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "clicktrail",
            "definition",
            "create",
            "--destination",
            "/landing",
            "--source",
            "newsletter",
            "--medium",
            "email",
            "--campaign",
            "spring",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Definition {
                action: DefinitionCommands::Create { content, term, .. },
            }) => {
                assert!(content.is_none());
                assert!(term.is_none());
            }
            _ => panic!("expected definition create"),
        }
    }

    #[test]
    fn test_purge_default_age() {
        let cli = Cli::try_parse_from(["clicktrail", "queue", "purge"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Queue {
                action: QueueCommands::Purge { older_than_days: 30 }
            })
        ));
    }
}
