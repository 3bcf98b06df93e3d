use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use tracing::warn;

use crate::storage::models::{
    CampaignDimensions, ClickRecord, ConversionRecord, JobStatus, NewClick, NewJob, QueueJob,
    RetryPolicy, TrackingDefinition,
};
use migration::entities::{click_record, conversion_record, report_job, tracking_definition};

/// 将 Sea-ORM Model 转换为 TrackingDefinition
pub fn model_to_definition(model: tracking_definition::Model) -> TrackingDefinition {
    TrackingDefinition {
        id: model.id,
        destination_url: model.destination_url,
        source: model.source,
        medium: model.medium,
        campaign: model.campaign,
        content: model.content,
        term: model.term,
        active: model.active,
        created_at: model.created_at,
    }
}

pub fn definition_to_active_model(def: &TrackingDefinition) -> tracking_definition::ActiveModel {
    tracking_definition::ActiveModel {
        id: Set(def.id.clone()),
        destination_url: Set(def.destination_url.clone()),
        source: Set(def.source.clone()),
        medium: Set(def.medium.clone()),
        campaign: Set(def.campaign.clone()),
        content: Set(def.content.clone()),
        term: Set(def.term.clone()),
        active: Set(def.active),
        created_at: Set(def.created_at),
    }
}

pub fn model_to_click(model: click_record::Model) -> ClickRecord {
    let platform_ids = model
        .platform_ids
        .as_deref()
        .and_then(|raw| match serde_json::from_str::<BTreeMap<String, String>>(raw) {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!("click {} has unreadable platform_ids: {}", model.id, e);
                None
            }
        })
        .unwrap_or_default();

    ClickRecord {
        id: model.id,
        tracking_id: model.tracking_id,
        clicked_at: model.clicked_at,
        dimensions: CampaignDimensions {
            source: model.source,
            medium: model.medium,
            campaign: model.campaign,
            content: model.content,
            term: model.term,
        },
        platform_ids,
    }
}

/// 将 NewClick 转换为 ActiveModel（id 由数据库生成）
pub fn new_click_to_active_model(click: &NewClick) -> click_record::ActiveModel {
    let platform_ids = if click.platform_ids.is_empty() {
        None
    } else {
        serde_json::to_string(&click.platform_ids).ok()
    };

    click_record::ActiveModel {
        id: NotSet,
        tracking_id: Set(click.tracking_id.clone()),
        clicked_at: Set(click.clicked_at),
        source: Set(click.dimensions.source.clone()),
        medium: Set(click.dimensions.medium.clone()),
        campaign: Set(click.dimensions.campaign.clone()),
        content: Set(click.dimensions.content.clone()),
        term: Set(click.dimensions.term.clone()),
        platform_ids: Set(platform_ids),
    }
}

pub fn model_to_conversion(model: conversion_record::Model) -> ConversionRecord {
    ConversionRecord {
        id: model.id,
        click_id: model.click_id,
        tracking_id: model.tracking_id,
        value: model.value,
        converted_at: model.converted_at,
    }
}

pub fn conversion_to_active_model(
    click_id: i64,
    tracking_id: &str,
    value: f64,
    converted_at: DateTime<Utc>,
) -> conversion_record::ActiveModel {
    conversion_record::ActiveModel {
        id: NotSet,
        click_id: Set(click_id),
        tracking_id: Set(tracking_id.to_string()),
        value: Set(value),
        converted_at: Set(converted_at),
    }
}

pub fn model_to_job(model: report_job::Model) -> QueueJob {
    let status = JobStatus::from_str(&model.status).unwrap_or_else(|_| {
        warn!("job {} has unknown status '{}'", model.id, model.status);
        JobStatus::Failed
    });
    let payload = serde_json::from_str(&model.payload).unwrap_or_else(|e| {
        warn!("job {} payload is not valid JSON: {}", model.id, e);
        serde_json::Value::String(model.payload.clone())
    });

    QueueJob {
        id: model.id,
        reporter: model.reporter,
        payload,
        status,
        attempts: model.attempts.max(0) as u32,
        label: model.label,
        policy: RetryPolicy {
            attempts_per_round: model.attempts_per_round.max(1) as u32,
            attempt_delay_secs: model.attempt_delay_secs.max(0) as u64,
            max_rounds: model.max_rounds.max(1) as u32,
            round_delay_secs: model.round_delay_secs.max(0) as u64,
        },
        retry_after: model.retry_after,
        last_error: model.last_error,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

pub fn new_job_to_active_model(job: &NewJob, now: DateTime<Utc>) -> report_job::ActiveModel {
    report_job::ActiveModel {
        id: NotSet,
        reporter: Set(job.reporter.clone()),
        payload: Set(job.payload.to_string()),
        status: Set(JobStatus::Pending.as_ref().to_string()),
        attempts: Set(0),
        label: Set(job.label.clone()),
        attempts_per_round: Set(job.policy.attempts_per_round as i32),
        attempt_delay_secs: Set(job.policy.attempt_delay_secs as i64),
        max_rounds: Set(job.policy.max_rounds as i32),
        round_delay_secs: Set(job.policy.round_delay_secs as i64),
        retry_after: Set(None),
        last_error: Set(None),
        claim_token: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_model(status: &str, payload: &str) -> report_job::Model {
        let now = Utc::now();
        report_job::Model {
            id: 9,
            reporter: "webhook".to_string(),
            payload: payload.to_string(),
            status: status.to_string(),
            attempts: 2,
            label: Some("conversion".to_string()),
            attempts_per_round: 3,
            attempt_delay_secs: 60,
            max_rounds: 2,
            round_delay_secs: 3600,
            retry_after: None,
            last_error: None,
            claim_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_model_to_job() {
        let job = model_to_job(job_model("pending", r#"{"weights":{"a":1.0}}"#));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.policy.round_delay_secs, 3600);
        assert_eq!(job.payload["weights"]["a"], 1.0);
    }

    #[test]
    fn test_model_to_job_tolerates_bad_rows() {
        let job = model_to_job(job_model("bogus", "not json"));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.payload, serde_json::Value::String("not json".to_string()));
    }

    #[test]
    fn test_click_platform_ids_roundtrip_through_column() {
        let mut ids = BTreeMap::new();
        ids.insert("gclid".to_string(), "abc".to_string());
        let new_click = NewClick {
            tracking_id: "a".repeat(64),
            clicked_at: Utc::now(),
            dimensions: CampaignDimensions::default(),
            platform_ids: ids.clone(),
        };
        let active = new_click_to_active_model(&new_click);
        let column = active.platform_ids.clone().unwrap();
        assert_eq!(column.as_deref(), Some(r#"{"gclid":"abc"}"#));

        let model = click_record::Model {
            id: 1,
            tracking_id: new_click.tracking_id.clone(),
            clicked_at: new_click.clicked_at,
            source: None,
            medium: None,
            campaign: None,
            content: None,
            term: None,
            platform_ids: column,
        };
        assert_eq!(model_to_click(model).platform_ids, ids);
    }

    #[test]
    fn test_empty_platform_ids_stored_as_null() {
        let new_click = NewClick {
            tracking_id: "b".repeat(64),
            clicked_at: Utc::now(),
            dimensions: CampaignDimensions::default(),
            platform_ids: BTreeMap::new(),
        };
        assert_eq!(new_click_to_active_model(&new_click).platform_ids.unwrap(), None);
    }
}
