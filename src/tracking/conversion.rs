//! Conversion-time attribution

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::cookie::Cookie;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::bot::{BotDetector, UserAgentBotDetector};
use super::consent::{ConsentGate, ConsentState};
use super::hooks::{ConversionEvent, ConversionObserver, HookRegistry};
use super::weights::{LastClick, WeightingStrategy, compute_weights};
use super::{RequestContext, TrackingSettings};
use crate::queue::{QueueTrigger, ReportQueue};
use crate::reporters::{AttributedClick, ConversionReport, ReporterRegistry};
use crate::session::VisitorTokens;
use crate::storage::{ClickRecord, SeaOrmStorage};

/// Terminal state of one conversion trigger.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Bot,
    /// 同意状态不是 granted，未读取 session
    ConsentNotGranted(ConsentState),
    NoSession,
    NoActiveDefinitions,
    /// 全部标识符都在转化去重窗口内
    Deduplicated,
    /// 查询或事务失败，已回滚
    Failed,
    Attributed {
        weights: Vec<(String, f64)>,
        conversion_ids: Vec<i64>,
        cookies: Vec<Cookie<'static>>,
    },
}

impl ConversionOutcome {
    pub fn is_attributed(&self) -> bool {
        matches!(self, ConversionOutcome::Attributed { .. })
    }

    pub fn cookies(&self) -> &[Cookie<'static>] {
        match self {
            ConversionOutcome::Attributed { cookies, .. } => cookies,
            _ => &[],
        }
    }
}

pub struct AttributionCalculator {
    storage: Arc<SeaOrmStorage>,
    tokens: VisitorTokens,
    settings: TrackingSettings,
    consent: ConsentGate,
    bot_detector: Arc<dyn BotDetector>,
    weighting: Arc<dyn WeightingStrategy>,
    observers: Arc<HookRegistry<dyn ConversionObserver>>,
    reporters: Arc<ReporterRegistry>,
    queue: Option<(Arc<ReportQueue>, QueueTrigger)>,
}

impl AttributionCalculator {
    pub fn new(storage: Arc<SeaOrmStorage>, tokens: VisitorTokens, settings: TrackingSettings) -> Self {
        Self {
            storage,
            tokens,
            settings,
            consent: ConsentGate::new(ConsentState::Granted),
            bot_detector: Arc::new(UserAgentBotDetector::new(&[])),
            weighting: Arc::new(LastClick),
            observers: Arc::new(HookRegistry::new()),
            reporters: Arc::new(ReporterRegistry::new()),
            queue: None,
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

    pub fn with_weighting(mut self, weighting: Arc<dyn WeightingStrategy>) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_observers(mut self, observers: Arc<HookRegistry<dyn ConversionObserver>>) -> Self {
        self.observers = observers;
        self
    }

    /// 报告器 payload 写入 `queue`，随后通过 `trigger` 唤醒处理任务
    pub fn with_reporters(
        mut self,
        reporters: Arc<ReporterRegistry>,
        queue: Arc<ReportQueue>,
        trigger: QueueTrigger,
    ) -> Self {
        self.reporters = reporters;
        self.queue = Some((queue, trigger));
        self
    }

    pub fn observers(&self) -> &Arc<HookRegistry<dyn ConversionObserver>> {
        &self.observers
    }

    pub fn reporters(&self) -> &Arc<ReporterRegistry> {
        &self.reporters
    }

    pub async fn on_conversion(&self, ctx: &RequestContext) -> ConversionOutcome {
        self.on_conversion_at(ctx, Utc::now()).await
    }

    pub async fn on_conversion_at(
        &self,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> ConversionOutcome {
        if self.bot_detector.is_bot(ctx) {
            debug!("Conversion ignored at bot check ({})", ctx.path);
            return ConversionOutcome::Bot;
        }

        let consent = self.consent.resolve(ctx);
        if consent != ConsentState::Granted {
            debug!("Conversion ignored at consent check: {}", consent);
            return ConversionOutcome::ConsentNotGranted(consent);
        }

        let max_entries = self.settings.session_max_entries;
        let mut session = self.tokens.read_session(&ctx.cookies, max_entries);
        if session.is_empty() {
            debug!("Conversion ignored at session read: no tracked clicks");
            return ConversionOutcome::NoSession;
        }

        let definitions = match self.storage.get_active_definitions(&session.ids()).await {
            Ok(definitions) => definitions,
            Err(e) => {
                error!("Conversion aborted at definition lookup: {}", e);
                return ConversionOutcome::Failed;
            }
        };
        session.retain(|id, _| definitions.contains_key(id));
        if session.is_empty() {
            info!("Conversion ignored at definition filter: no active definitions in session");
            return ConversionOutcome::NoActiveDefinitions;
        }

        let now_ts = now.timestamp();
        let window = self.settings.conversion_dedup_window_secs;
        let mut marker = None;
        if window > 0 {
            let dedup = self.tokens.read_dedup(&ctx.cookies, max_entries);
            session.retain(|id, _| {
                dedup
                    .get(id)
                    .is_none_or(|last| now_ts - last >= window as i64)
            });
            if session.is_empty() {
                info!("Conversion ignored at dedup: every id converted within {}s", window);
                return ConversionOutcome::Deduplicated;
            }
            marker = Some(dedup);
        }

        let clicks: Vec<(String, i64)> = session.iter().map(|(id, ts)| (id.to_string(), ts)).collect();
        let weights = compute_weights(self.weighting.as_ref(), &clicks, now_ts);

        let records = match self.storage.record_conversion(&weights, now).await {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "Conversion aborted at persist for [{}]: {}",
                    clicks.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>().join(","),
                    e
                );
                return ConversionOutcome::Failed;
            }
        };
        info!(
            "Conversion attributed to {} of {} ids ({})",
            records.len(),
            weights.len(),
            self.weighting.name()
        );

        let mut cookies = Vec::new();
        if let Some(mut marker) = marker {
            // 整个参与归因的集合都写入标记，包括权重为 0 的标识符
            for (id, _) in &weights {
                marker.add(id, now_ts);
            }
            cookies.push(self.tokens.dedup_cookie(&marker, window));
        }

        let event = ConversionEvent {
            weights: &weights,
            ctx,
        };
        for (_, observer) in self.observers.snapshot() {
            observer.on_conversion(&event);
        }

        self.enqueue_reports(&weights, ctx, now).await;

        ConversionOutcome::Attributed {
            weights,
            conversion_ids: records.iter().map(|r| r.id).collect(),
            cookies,
        }
    }

    async fn enqueue_reports(&self, weights: &[(String, f64)], ctx: &RequestContext, now: DateTime<Utc>) {
        let Some((queue, trigger)) = &self.queue else {
            return;
        };
        let reporters = self.reporters.snapshot();
        if reporters.is_empty() {
            return;
        }

        let ids: Vec<String> = weights.iter().map(|(id, _)| id.clone()).collect();
        let latest = self.storage.latest_clicks(&ids).await.unwrap_or_else(|e| {
            warn!("Could not load clicks for reporters: {}", e);
            HashMap::new()
        });
        let report = build_report(weights, &latest, ctx, now);

        let mut enqueued = 0;
        for (name, reporter) in reporters {
            let Some(payload) = reporter.build_payload(&report) else {
                continue;
            };
            match queue
                .enqueue(&name, payload, reporter.label(&report), reporter.retry_policy())
                .await
            {
                Ok(_) => enqueued += 1,
                Err(e) => error!("Failed to enqueue report for {}: {}", name, e),
            }
        }
        if enqueued > 0 {
            trigger.schedule();
        }
    }
}

impl std::fmt::Debug for AttributionCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributionCalculator")
            .field("settings", &self.settings)
            .field("weighting", &self.weighting.name())
            .field("reporters", &self.reporters)
            .finish()
    }
}

fn build_report(
    weights: &[(String, f64)],
    latest: &HashMap<String, ClickRecord>,
    ctx: &RequestContext,
    now: DateTime<Utc>,
) -> ConversionReport {
    let clicks = weights
        .iter()
        .map(|(id, weight)| {
            let click = latest.get(id);
            AttributedClick {
                tracking_id: id.clone(),
                weight: *weight,
                click_id: click.map(|c| c.id),
                clicked_at: click.map(|c| c.clicked_at),
                dimensions: click.map(|c| c.dimensions.clone()).unwrap_or_default(),
                platform_ids: click.map(|c| c.platform_ids.clone()).unwrap_or_default(),
            }
        })
        .collect();

    ConversionReport {
        converted_at: now,
        clicks,
        ip: ctx.ip.clone(),
        user_agent: ctx.user_agent.clone(),
        landing_path: ctx.path.clone(),
    }
}
