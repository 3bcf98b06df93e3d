//! Tracking-route click recording

use std::collections::HashSet;
use std::sync::Arc;

use actix_web::cookie::Cookie;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use url::Url;

use super::bot::{BotDetector, UserAgentBotDetector};
use super::consent::{ConsentGate, ConsentState};
use super::hooks::{ClickEvent, ClickObserver, HookRegistry};
use super::params::{extract_platform_ids, resolve_dimensions};
use super::{RequestContext, TrackingSettings};
use crate::config::{DeferredTransport, RedirectMode};
use crate::errors::{ClicktrailError, Result};
use crate::session::{ClickSession, VisitorTokens};
use crate::storage::{NewClick, SeaOrmStorage};
use crate::utils::is_valid_tracking_id;

/// What happened to the click itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickDisposition {
    /// 机器流量，无任何副作用
    Bot,
    /// 点击去重窗口内的重复访问，仅刷新 session 时间戳
    Repeat,
    Recorded { click_id: i64 },
    /// 写入失败，访客仍被重定向
    Dropped,
}

/// Terminal state of one tracking-route request.
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    /// 路由中没有标识符
    PassThrough,
    NotFound,
    Redirect {
        location: String,
        mode: RedirectMode,
        cookies: Vec<Cookie<'static>>,
        disposition: ClickDisposition,
    },
}

impl ClickOutcome {
    pub fn is_redirect(&self) -> bool {
        matches!(self, ClickOutcome::Redirect { .. })
    }

    pub fn disposition(&self) -> Option<&ClickDisposition> {
        match self {
            ClickOutcome::Redirect { disposition, .. } => Some(disposition),
            _ => None,
        }
    }
}

pub struct ClickRecorder {
    storage: Arc<SeaOrmStorage>,
    tokens: VisitorTokens,
    settings: TrackingSettings,
    consent: ConsentGate,
    bot_detector: Arc<dyn BotDetector>,
    observers: Arc<HookRegistry<dyn ClickObserver>>,
}

impl ClickRecorder {
    pub fn new(storage: Arc<SeaOrmStorage>, tokens: VisitorTokens, settings: TrackingSettings) -> Self {
        Self {
            storage,
            tokens,
            settings,
            consent: ConsentGate::new(ConsentState::Granted),
            bot_detector: Arc::new(UserAgentBotDetector::new(&[])),
            observers: Arc::new(HookRegistry::new()),
        }
    }

    pub fn with_consent(mut self, consent: ConsentGate) -> Self {
        self.consent = consent;
        self
    }

    pub fn with_bot_detector(mut self, detector: Arc<dyn BotDetector>) -> Self {
        self.bot_detector = detector;
        self
    }

    pub fn with_observers(mut self, observers: Arc<HookRegistry<dyn ClickObserver>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn observers(&self) -> &Arc<HookRegistry<dyn ClickObserver>> {
        &self.observers
    }

    pub fn settings(&self) -> &TrackingSettings {
        &self.settings
    }

    pub async fn handle(&self, raw_id: &str, ctx: &RequestContext) -> ClickOutcome {
        self.handle_at(raw_id, ctx, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        raw_id: &str,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> ClickOutcome {
        let id = raw_id.trim();
        if id.is_empty() {
            return ClickOutcome::PassThrough;
        }
        if !is_valid_tracking_id(id) {
            debug!("Click rejected at validation: malformed id '{}'", id);
            return ClickOutcome::NotFound;
        }

        let definition = match self.storage.get_active_definition(id).await {
            Ok(Some(def)) => def,
            Ok(None) => {
                info!("Click rejected at lookup: no active definition for {}", id);
                return ClickOutcome::NotFound;
            }
            Err(e) => {
                error!("Click rejected at lookup for {}: {}", id, e);
                return ClickOutcome::NotFound;
            }
        };

        let Some(destination) = definition
            .destination_url
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        else {
            warn!("Click rejected at destination: {} has no destination", id);
            return ClickOutcome::NotFound;
        };

        let mut target =
            match merge_destination(&self.settings.site_url, destination, ctx, &self.settings.id_param) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Click rejected at destination for {}: {}", id, e);
                    return ClickOutcome::NotFound;
                }
            };

        if is_tracking_loop(&target, &self.settings.site_url, &self.settings.prefix) {
            warn!(
                "Click rejected at loop guard: {} points back into {} ({})",
                id, self.settings.prefix, target
            );
            return ClickOutcome::NotFound;
        }

        if self.bot_detector.is_bot(ctx) {
            debug!("Bot traffic on {}, redirecting without side effects", id);
            return self.redirect(target, Vec::new(), ClickDisposition::Bot);
        }

        let consent = self.consent.resolve(ctx);
        let now_ts = now.timestamp();
        let mut session = match consent {
            ConsentState::Denied => ClickSession::new(self.settings.session_max_entries),
            _ => self
                .tokens
                .read_session(&ctx.cookies, self.settings.session_max_entries),
        };

        let repeat = consent != ConsentState::Denied
            && self.settings.click_dedup_window_secs > 0
            && session
                .get(id)
                .is_some_and(|ts| {
                    // 未来时间戳视为窗口之外
                    ts <= now_ts && now_ts - ts < self.settings.click_dedup_window_secs as i64
                });

        let platform_ids = extract_platform_ids(ctx);
        let (disposition, click) = if repeat {
            debug!("Repeat click on {} inside the dedup window", id);
            (ClickDisposition::Repeat, None)
        } else {
            let new_click = NewClick {
                tracking_id: id.to_string(),
                clicked_at: now,
                dimensions: resolve_dimensions(&definition.dimensions(), ctx),
                platform_ids: platform_ids.clone(),
            };
            match self.storage.insert_click(&new_click).await {
                Ok(record) => {
                    info!("Click recorded for {} (click id {}, consent {})", id, record.id, consent);
                    (ClickDisposition::Recorded { click_id: record.id }, Some(record))
                }
                Err(e) => {
                    error!("Click dropped at persist for {}: {}", id, e);
                    (ClickDisposition::Dropped, None)
                }
            }
        };

        let event = ClickEvent {
            tracking_id: id,
            definition: &definition,
            click: click.as_ref(),
            consent,
            platform_ids: &platform_ids,
            raw_query: &ctx.raw_query,
            ctx,
        };
        for (_, observer) in self.observers.snapshot() {
            observer.on_click(&event);
        }

        if disposition == ClickDisposition::Dropped {
            return self.redirect(target, Vec::new(), disposition);
        }

        let mut cookies = Vec::new();
        match consent {
            ConsentState::Granted => {
                session.add(id, now_ts);
                cookies.push(self.tokens.session_cookie(&session));
            }
            ConsentState::Denied => {}
            ConsentState::Undetermined => {
                let mut pending = ClickSession::new(self.settings.session_max_entries);
                pending.add(id, now_ts);
                match self.settings.deferred_transport {
                    DeferredTransport::Cookie => cookies.push(self.tokens.deferred_cookie(&pending)),
                    DeferredTransport::Fragment => {
                        let fragment = self.tokens.deferred_fragment(&pending);
                        let combined = match target.fragment() {
                            Some(existing) if !existing.is_empty() => {
                                format!("{}&{}", existing, fragment)
                            }
                            _ => fragment,
                        };
                        target.set_fragment(Some(&combined));
                    }
                }
            }
        }

        self.redirect(target, cookies, disposition)
    }

    fn redirect(
        &self,
        target: Url,
        cookies: Vec<Cookie<'static>>,
        disposition: ClickDisposition,
    ) -> ClickOutcome {
        ClickOutcome::Redirect {
            location: target.to_string(),
            mode: self.settings.redirect_mode,
            cookies,
            disposition,
        }
    }
}

impl std::fmt::Debug for ClickRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickRecorder")
            .field("settings", &self.settings)
            .field("consent", &self.consent)
            .field("observers", &self.observers)
            .finish()
    }
}

/// Resolve `destination` against the site and merge the visit's query.
///
/// The tracking id parameter is stripped from the incoming query first; on a
/// key collision the destination's own value wins.
pub fn merge_destination(
    site_url: &Url,
    destination: &str,
    ctx: &RequestContext,
    id_param: &str,
) -> Result<Url> {
    let mut url = site_url.join(destination)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClicktrailError::validation(format!(
            "destination scheme '{}' is not redirectable",
            url.scheme()
        )));
    }

    let existing: HashSet<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let extra: Vec<&(String, String)> = ctx
        .query
        .iter()
        .filter(|(k, _)| k != id_param && !existing.contains(k))
        .collect();

    if !extra.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in extra {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// 目标落在本站的追踪前缀下即视为循环
pub fn is_tracking_loop(target: &Url, site_url: &Url, prefix: &str) -> bool {
    let same_site = target.host_str() == site_url.host_str()
        && target.port_or_known_default() == site_url.port_or_known_default();
    if !same_site {
        return false;
    }
    let path = target.path();
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Url {
        Url::parse("https://shop.example.com/").unwrap()
    }

    #[test]
    fn test_merge_destination_strips_id_param_and_keeps_destination_values() {
        let ctx = RequestContext::default().with_query("trk=abc&utm_source=mail&ref=visit");
        let url = merge_destination(&site(), "/landing?ref=dest", &ctx, "trk").unwrap();
        assert_eq!(
            url.as_str(),
            "https://shop.example.com/landing?ref=dest&utm_source=mail"
        );
    }

    #[test]
    fn test_merge_destination_without_extra_params_is_untouched() {
        let ctx = RequestContext::default().with_query("trk=abc");
        let url = merge_destination(&site(), "https://other.example.org/p", &ctx, "trk").unwrap();
        assert_eq!(url.as_str(), "https://other.example.org/p");
    }

    #[test]
    fn test_merge_destination_rejects_non_http_schemes() {
        let ctx = RequestContext::default();
        assert!(merge_destination(&site(), "javascript:alert(1)", &ctx, "trk").is_err());
    }

    #[test]
    fn test_loop_guard() {
        let s = site();
        let hit = |u: &str| is_tracking_loop(&Url::parse(u).unwrap(), &s, "/go");
        assert!(hit("https://shop.example.com/go"));
        assert!(hit("https://shop.example.com/go/abc?x=1"));
        assert!(!hit("https://shop.example.com/gone"));
        assert!(!hit("https://elsewhere.example.com/go/abc"));
        assert!(!hit("https://shop.example.com:8443/go/abc"));
    }
}
