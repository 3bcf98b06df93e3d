//! Component wiring
//!
//! 所有引擎组件在启动时构建一次并注入，核心代码不读取全局配置。

use std::sync::Arc;

use tracing::warn;

use crate::config::StaticConfig;
use crate::errors::Result;
use crate::queue::{QueueProcessor, QueueScheduler, QueueSettings, QueueTrigger, ReportQueue};
use crate::reporters::{ReporterRegistry, build_reporters};
use crate::session::{CookieSettings, TokenSigner, VisitorTokens};
use crate::storage::SeaOrmStorage;
use crate::tracking::bot::{BotDetector, UserAgentBotDetector};
use crate::tracking::weights::strategy_for;
use crate::tracking::{
    AttributionCalculator, ClickObserver, ClickRecorder, ConsentGate, ConversionObserver,
    CookieConsentResolver, HookRegistry, TrackingSettings,
};

/// The assembled attribution engine.
pub struct Engine {
    pub storage: Arc<SeaOrmStorage>,
    pub settings: TrackingSettings,
    pub queue_settings: QueueSettings,
    pub tokens: VisitorTokens,
    pub consent: ConsentGate,
    pub recorder: Arc<ClickRecorder>,
    pub calculator: Arc<AttributionCalculator>,
    pub click_observers: Arc<HookRegistry<dyn ClickObserver>>,
    pub conversion_observers: Arc<HookRegistry<dyn ConversionObserver>>,
    pub reporters: Arc<ReporterRegistry>,
    pub queue: Arc<ReportQueue>,
    pub trigger: QueueTrigger,
}

impl Engine {
    pub fn from_config(config: &StaticConfig, storage: Arc<SeaOrmStorage>) -> Result<Self> {
        let tracking = &config.tracking;
        let settings = TrackingSettings::from_config(tracking)?;
        let queue_settings = QueueSettings::from_config(&config.queue);

        let signer = if tracking.secret.is_empty() {
            warn!(
                "tracking.secret is not set; using a random signing key, visitor sessions will not survive a restart"
            );
            TokenSigner::random()
        } else {
            TokenSigner::new(tracking.secret.as_bytes())?
        };
        let tokens = VisitorTokens::new(
            signer,
            CookieSettings {
                session_name: tracking.session_cookie.clone(),
                dedup_name: tracking.dedup_cookie.clone(),
                deferred_name: tracking.deferred_cookie.clone(),
                secure: tracking.cookie_secure,
                session_lifetime_secs: settings.session_lifetime_secs,
            },
        );

        let mut consent = ConsentGate::new(tracking.default_consent);
        if let Some(cookie) = tracking.consent_cookie.as_deref().filter(|c| !c.trim().is_empty()) {
            consent = consent.with_resolver(Arc::new(CookieConsentResolver::new(
                cookie.trim(),
                &tracking.consent_granted_values,
                &tracking.consent_denied_values,
            )));
        }

        let bot_detector: Arc<dyn BotDetector> =
            Arc::new(UserAgentBotDetector::new(&tracking.bot_markers));
        let click_observers = Arc::new(HookRegistry::new());
        let conversion_observers = Arc::new(HookRegistry::new());
        let reporters = Arc::new(build_reporters(&config.reporters));
        let queue = Arc::new(ReportQueue::new(
            Arc::clone(&storage),
            queue_settings.default_policy,
        ));
        let trigger = QueueTrigger::new();

        let recorder = ClickRecorder::new(Arc::clone(&storage), tokens.clone(), settings.clone())
            .with_consent(consent.clone())
            .with_bot_detector(Arc::clone(&bot_detector))
            .with_observers(Arc::clone(&click_observers));

        let calculator =
            AttributionCalculator::new(Arc::clone(&storage), tokens.clone(), settings.clone())
                .with_consent(consent.clone())
                .with_bot_detector(bot_detector)
                .with_weighting(strategy_for(
                    tracking.weighting,
                    tracking.time_decay_half_life_secs,
                ))
                .with_observers(Arc::clone(&conversion_observers))
                .with_reporters(Arc::clone(&reporters), Arc::clone(&queue), trigger.clone());

        Ok(Self {
            storage,
            settings,
            queue_settings,
            tokens,
            consent,
            recorder: Arc::new(recorder),
            calculator: Arc::new(calculator),
            click_observers,
            conversion_observers,
            reporters,
            queue,
            trigger,
        })
    }

    pub fn processor(&self) -> QueueProcessor {
        QueueProcessor::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.reporters),
            self.queue_settings.batch_size,
        )
    }

    /// 启动后台队列处理任务
    pub fn spawn_scheduler(&self) -> QueueScheduler {
        QueueScheduler::spawn(
            self.processor(),
            self.trigger.clone(),
            self.queue_settings.idle_poll,
        )
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("queue_settings", &self.queue_settings)
            .field("reporters", &self.reporters)
            .finish()
    }
}
