//! Attribution engine
//!
//! - `click`: tracking-route state machine ([`ClickRecorder`])
//! - `conversion`: conversion-time attribution ([`AttributionCalculator`])
//! - `consent` / `bot` / `weights`: swappable strategies
//! - `hooks`: named observer registries

pub mod bot;
pub mod click;
pub mod consent;
pub mod conversion;
pub mod hooks;
pub mod params;
pub mod weights;

use std::collections::HashMap;

use url::Url;

use crate::config::{DeferredTransport, RedirectMode, TrackingConfig};
use crate::errors::{ClicktrailError, Result};

pub use bot::{BotDetector, UserAgentBotDetector};
pub use click::{ClickDisposition, ClickOutcome, ClickRecorder};
pub use consent::{ConsentGate, ConsentResolver, ConsentState, CookieConsentResolver};
pub use conversion::{AttributionCalculator, ConversionOutcome};
pub use hooks::{ClickEvent, ClickObserver, ConversionEvent, ConversionObserver, HookRegistry};
pub use weights::{LastClick, Linear, TimeDecay, WeightingStrategy};

/// Per-request input to the engine.
///
/// Built by the HTTP layer (or by a host embedding the library) from the
/// incoming request; the engine never touches actix types directly.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub path: String,
    pub referrer: Option<String>,
    /// 原始查询串（不含 `?`）
    pub raw_query: String,
    /// 解码后的查询参数，保持原始顺序
    pub query: Vec<(String, String)>,
    pub cookies: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, raw_query: &str) -> Self {
        let raw_query = raw_query.trim_start_matches('?');
        self.query = url::form_urlencoded::parse(raw_query.as_bytes())
            .into_owned()
            .collect();
        self.raw_query = raw_query.to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// 第一个非空的同名查询参数
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Engine settings, derived once from `[tracking]` at startup.
#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub prefix: String,
    pub id_param: String,
    pub site_url: Url,
    pub fallback_url: Option<String>,
    pub session_max_entries: usize,
    pub session_lifetime_secs: u64,
    pub click_dedup_window_secs: u64,
    pub conversion_dedup_window_secs: u64,
    pub deferred_transport: DeferredTransport,
    pub redirect_mode: RedirectMode,
}

impl TrackingSettings {
    pub fn from_config(config: &TrackingConfig) -> Result<Self> {
        let site_url = Url::parse(&config.site_url).map_err(|e| {
            ClicktrailError::config(format!("tracking.site_url '{}' is invalid: {}", config.site_url, e))
        })?;
        Ok(Self {
            prefix: normalize_prefix(&config.prefix),
            id_param: config.id_param.clone(),
            site_url,
            fallback_url: config.fallback_url.clone().filter(|u| !u.trim().is_empty()),
            session_max_entries: config.session_max_entries.max(1),
            session_lifetime_secs: config.session_lifetime_days.saturating_mul(86400),
            click_dedup_window_secs: config.click_dedup_window_secs,
            conversion_dedup_window_secs: config.conversion_dedup_window_secs,
            deferred_transport: config.deferred_transport,
            redirect_mode: config.redirect_mode,
        })
    }
}

/// 规范化路由前缀：以 `/` 开头，不以 `/` 结尾
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    format!("/{}", trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("go"), "/go");
        assert_eq!(normalize_prefix("/go/"), "/go");
        assert_eq!(normalize_prefix("/t/r"), "/t/r");
    }

    #[test]
    fn test_query_param_skips_empty_values() {
        let ctx = RequestContext::new("/go/x").with_query("?utm_source=&utm_source=mail&x=1");
        assert_eq!(ctx.query_param("utm_source"), Some("mail"));
        assert_eq!(ctx.query_param("missing"), None);
        assert_eq!(ctx.raw_query, "utm_source=&utm_source=mail&x=1");
    }

    #[test]
    fn test_settings_from_config() {
        let config = TrackingConfig {
            session_lifetime_days: 2,
            fallback_url: Some("   ".to_string()),
            ..Default::default()
        };
        let settings = TrackingSettings::from_config(&config).unwrap();
        assert_eq!(settings.session_lifetime_secs, 2 * 86400);
        assert_eq!(settings.fallback_url, None);
        assert_eq!(settings.prefix, "/go");
    }

    #[test]
    fn test_settings_reject_bad_site_url() {
        let config = TrackingConfig {
            site_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(TrackingSettings::from_config(&config).is_err());
    }
}
