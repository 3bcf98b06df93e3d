//! Configuration commands

use std::io::{self, BufRead, Write};
use std::path::Path;

use colored::Colorize;

use crate::config::StaticConfig;
use crate::interfaces::cli::CliError;

/// Generate example configuration file
pub async fn config_generate(output_path: Option<String>, force: bool) -> Result<(), CliError> {
    let path = output_path.unwrap_or_else(|| "config.example.toml".to_string());

    // 文件已存在时，非 --force 模式下交互确认
    if !force && Path::new(&path).exists() {
        print!(
            "{} {} {}",
            "File already exists:".yellow(),
            path.blue(),
            "Overwrite? [y/N] ".yellow()
        );
        io::stdout()
            .flush()
            .map_err(|e| CliError::CommandError(e.to_string()))?;

        let mut input = String::new();
        io::stdin()
            .lock()
            .read_line(&mut input)
            .map_err(|e| CliError::CommandError(e.to_string()))?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Aborted.".red());
            return Ok(());
        }
    }

    println!(
        "{} {}",
        "Generating configuration file...".yellow(),
        path.blue()
    );

    match StaticConfig::default().save_to_file(&path) {
        Ok(()) => {
            println!(
                "  {} {}",
                "Configuration file generated successfully".green(),
                path.blue()
            );
            println!(
                "  {}",
                "Set tracking.secret (32+ bytes) and tracking.site_url before going live".yellow()
            );
            Ok(())
        }
        Err(e) => Err(CliError::CommandError(format!(
            "Unable to write configuration file: {}",
            e
        ))),
    }
}

/// Print the effective configuration with the signing secret masked
pub fn config_show(config: &StaticConfig) -> Result<(), CliError> {
    let mut shown = config.clone();
    if !shown.tracking.secret.is_empty() {
        shown.tracking.secret = "********".to_string();
    }
    let rendered =
        toml::to_string_pretty(&shown).map_err(|e| CliError::ParseError(e.to_string()))?;
    println!("{}", rendered);
    Ok(())
}
