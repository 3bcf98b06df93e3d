//! Tracking definition commands

use chrono::Utc;
use colored::Colorize;
use url::Url;

use crate::config::TrackingConfig;
use crate::interfaces::cli::CliError;
use crate::storage::{SeaOrmStorage, TrackingDefinition};
use crate::tracking::normalize_prefix;
use crate::utils::{generate_tracking_id, is_valid_tracking_id};

pub struct NewDefinitionArgs {
    pub destination: String,
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub content: Option<String>,
    pub term: Option<String>,
}

fn required(name: &str, value: String) -> Result<String, CliError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(CliError::ParseError(format!("--{} must not be empty", name)));
    }
    Ok(value)
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 构建定义；目标地址必须能基于 site_url 解析为 http(s) URL
pub fn build_definition(
    tracking: &TrackingConfig,
    args: NewDefinitionArgs,
) -> Result<TrackingDefinition, CliError> {
    let destination = required("destination", args.destination)?;
    let site = Url::parse(&tracking.site_url)
        .map_err(|e| CliError::ParseError(format!("tracking.site_url is invalid: {}", e)))?;
    let resolved = site
        .join(&destination)
        .map_err(|e| CliError::ParseError(format!("destination is invalid: {}", e)))?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return Err(CliError::ParseError(format!(
            "destination scheme '{}' is not redirectable",
            resolved.scheme()
        )));
    }

    Ok(TrackingDefinition {
        id: generate_tracking_id(),
        destination_url: Some(destination),
        source: required("source", args.source)?,
        medium: required("medium", args.medium)?,
        campaign: required("campaign", args.campaign)?,
        content: optional(args.content),
        term: optional(args.term),
        active: true,
        created_at: Utc::now(),
    })
}

pub async fn create_definition(
    storage: &SeaOrmStorage,
    tracking: &TrackingConfig,
    args: NewDefinitionArgs,
) -> Result<(), CliError> {
    let definition = build_definition(tracking, args)?;
    storage.insert_definition(&definition).await?;

    println!(
        "{} Created tracking definition {}",
        "✓".bold().green(),
        definition.id.cyan()
    );
    println!(
        "  {} {}{}/{}",
        "Tracking URL:".dimmed(),
        tracking.site_url.trim_end_matches('/'),
        normalize_prefix(&tracking.prefix),
        definition.id
    );
    Ok(())
}

fn check_id(id: &str) -> Result<(), CliError> {
    if !is_valid_tracking_id(id) {
        return Err(CliError::ParseError(
            "tracking id must be 64 lowercase hex characters".to_string(),
        ));
    }
    Ok(())
}

pub async fn show_definition(storage: &SeaOrmStorage, id: &str) -> Result<(), CliError> {
    check_id(id)?;
    let Some(definition) = storage.get_definition(id).await? else {
        return Err(CliError::CommandError(format!("tracking definition {} not found", id)));
    };
    let clicks = storage.count_clicks(id).await?;
    let conversions = storage.conversions_for(id).await?;
    let attributed: f64 = conversions.iter().map(|c| c.value).sum();

    let status = if definition.active {
        "active".green()
    } else {
        "inactive".red()
    };
    println!("{} {}", definition.id.cyan(), status);
    println!(
        "  destination: {}",
        definition.destination_url.as_deref().unwrap_or("-").blue()
    );
    println!(
        "  source={} medium={} campaign={} content={} term={}",
        definition.source,
        definition.medium,
        definition.campaign,
        definition.content.as_deref().unwrap_or("-"),
        definition.term.as_deref().unwrap_or("-")
    );
    println!("  created: {}", definition.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  clicks: {}  conversions: {}  attributed value: {:.3}",
        clicks,
        conversions.len(),
        attributed
    );
    Ok(())
}

pub async fn deactivate_definition(storage: &SeaOrmStorage, id: &str) -> Result<(), CliError> {
    check_id(id)?;
    storage.deactivate_definition(id).await?;
    println!("{} Deactivated {}", "✓".bold().green(), id.cyan());
    Ok(())
}
