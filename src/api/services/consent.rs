//! Consent hand-off endpoint
//!
//! 客户端脚本在同意状态明确为 granted 后，把延迟传输中的标识符回传，
//! 合并进正式 session。全部校验通过才写入，否则不做任何修改。

use std::sync::Arc;
use std::time::Duration;

use actix_governor::{GovernorConfig, GovernorConfigBuilder, KeyExtractor, SimpleKeyExtractionError};
use actix_web::dev::ServiceRequest;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::Utc;
use governor::middleware::NoOpMiddleware;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::api::{AppState, request_context};
use crate::errors::{ClicktrailError, Result};
use crate::tracking::ConsentState;
use crate::utils::ip::extract_client_ip;

#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentResponse {
    pub success: bool,
    pub merged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn reject(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(ConsentResponse {
        success: false,
        merged: 0,
        error: Some(message.to_string()),
    })
}

pub struct ConsentService;

impl ConsentService {
    /// `POST {prefix}/consent`
    pub async fn handle_consent(
        req: HttpRequest,
        state: web::Data<AppState>,
        body: web::Json<ConsentRequest>,
    ) -> HttpResponse {
        let engine = &state.engine;
        let ctx = request_context(&req, &state.trusted_proxies);

        let consent = engine.consent.resolve(&ctx);
        if consent != ConsentState::Granted {
            debug!("Consent hand-off refused: consent is {}", consent);
            return reject(StatusCode::FORBIDDEN, "consent not granted");
        }

        let mut ids: Vec<String> = Vec::with_capacity(body.ids.len());
        for id in &body.ids {
            let id = id.trim();
            if !crate::utils::is_valid_tracking_id(id) {
                return reject(StatusCode::BAD_REQUEST, "malformed tracking id");
            }
            if !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        let max_entries = engine.settings.session_max_entries;
        if ids.is_empty() || ids.len() > max_entries {
            return reject(StatusCode::BAD_REQUEST, "expected between 1 and max session entries ids");
        }

        let definitions = match engine.storage.get_active_definitions(&ids).await {
            Ok(definitions) => definitions,
            Err(e) => {
                error!("Consent hand-off failed at definition lookup: {}", e);
                return reject(StatusCode::INTERNAL_SERVER_ERROR, "lookup failed");
            }
        };
        if let Some(missing) = ids.iter().find(|id| !definitions.contains_key(*id)) {
            info!("Consent hand-off refused: unknown tracking id {}", missing);
            return reject(StatusCode::NOT_FOUND, "unknown tracking id");
        }

        // 延迟 token 里保留了点击时间，没有时取当前时间
        let pending = engine.tokens.read_deferred(&ctx.cookies, max_entries);
        let now = Utc::now().timestamp();
        let mut session = engine.tokens.read_session(&ctx.cookies, max_entries);
        for id in &ids {
            session.add(id, pending.get(id).unwrap_or(now));
        }
        info!("Consent hand-off merged {} ids into the session", ids.len());

        HttpResponse::Ok()
            .insert_header(("Cache-Control", "no-store"))
            .cookie(engine.tokens.session_cookie(&session))
            .cookie(engine.tokens.clear_deferred_cookie())
            .json(ConsentResponse {
                success: true,
                merged: ids.len(),
                error: None,
            })
    }
}

/// 基于客户端 IP 的限流 key（可信代理后取转发地址）
#[derive(Debug, Clone)]
pub struct ConsentKeyExtractor {
    trusted_proxies: Arc<[String]>,
}

impl ConsentKeyExtractor {
    pub fn new(trusted_proxies: Arc<[String]>) -> Self {
        Self { trusted_proxies }
    }
}

impl KeyExtractor for ConsentKeyExtractor {
    type Key = String;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> std::result::Result<Self::Key, Self::KeyExtractionError> {
        extract_client_ip(&req.connection_info(), req.headers(), &self.trusted_proxies)
            .ok_or_else(|| SimpleKeyExtractionError::new("Unable to extract client IP"))
    }
}

/// 同意回传接口限流配置：每 IP 每分钟 `per_minute` 次
///
/// 配置只构建一次，各 worker 的 `Governor` 共享同一个限流器。
pub fn consent_rate_limit_config(
    per_minute: u32,
    trusted_proxies: Arc<[String]>,
) -> Result<GovernorConfig<ConsentKeyExtractor, NoOpMiddleware>> {
    let per_minute = per_minute.max(1);
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_millis(60_000 / u64::from(per_minute)))
        .burst_size(per_minute)
        .key_extractor(ConsentKeyExtractor::new(trusted_proxies))
        .finish()
        .ok_or_else(|| ClicktrailError::config("invalid consent rate limit"))?;

    debug!("Consent rate limiter created: {} req/min per IP", per_minute);
    Ok(config)
}
