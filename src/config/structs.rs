use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumMessage};

use crate::tracking::consent::ConsentState;

/// 未决同意状态下 session 写入的延迟传输方式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumIter, AsRefStr, EnumMessage,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeferredTransport {
    #[default]
    #[strum(message = "60-second signed cookie readable by client script")]
    Cookie,
    #[strum(message = "Signed token appended to the destination URL fragment")]
    Fragment,
}

/// 跳转方式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumIter, AsRefStr, EnumMessage,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RedirectMode {
    #[default]
    #[strum(message = "Immediate HTTP 302 redirect")]
    Http,
    #[strum(message = "HTML page that navigates client-side, letting consent scripts run first")]
    Client,
}

/// 归因权重模型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, EnumIter, AsRefStr, EnumMessage,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeightingModel {
    #[default]
    #[strum(message = "Most recent click receives all credit")]
    LastClick,
    #[strum(message = "Credit split evenly across clicks")]
    Linear,
    #[strum(message = "Exponential decay by click age")]
    TimeDecay,
}

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 优先级：ENV > config.toml > 默认值
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub reporters: ReportersConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// ENV 前缀：CT，分隔符：__
    /// 示例：CT__TRACKING__PREFIX=/go
    pub fn load(path: Option<&str>) -> Self {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("CT")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.trusted_proxies")
                    .with_list_parse_key("tracking.bot_markers")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default = "default_cpu_count")]
    pub cpu_count: usize,
    /// 可信反向代理（IP 或 CIDR），仅来自这些地址的 X-Forwarded-For 会被采信
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 追踪 / 归因配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 追踪路由前缀，例如 /go/{id}
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// 追踪标识符自身的查询参数名（合并目标 URL 前剔除）
    #[serde(default = "default_id_param")]
    pub id_param: String,
    /// 站点根 URL，相对目标地址基于它解析
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// 标识符为空时的回退跳转地址
    #[serde(default)]
    pub fallback_url: Option<String>,
    /// Cookie 签名密钥（至少 32 字节），留空时启动随机生成
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_dedup_cookie")]
    pub dedup_cookie: String,
    #[serde(default = "default_deferred_cookie")]
    pub deferred_cookie: String,
    #[serde(default = "default_session_lifetime_days")]
    pub session_lifetime_days: u64,
    #[serde(default = "default_session_max_entries")]
    pub session_max_entries: usize,
    /// 点击去重窗口（秒），0 表示关闭
    #[serde(default)]
    pub click_dedup_window_secs: u64,
    /// 转化去重窗口（秒），0 表示关闭
    #[serde(default)]
    pub conversion_dedup_window_secs: u64,
    #[serde(default)]
    pub deferred_transport: DeferredTransport,
    #[serde(default)]
    pub redirect_mode: RedirectMode,
    /// 未注册同意解析器时的默认同意状态
    #[serde(default = "default_consent")]
    pub default_consent: ConsentState,
    /// 同意管理平台写入的 cookie 名，设置后启用内置 cookie 解析器
    #[serde(default)]
    pub consent_cookie: Option<String>,
    #[serde(default = "default_consent_granted_values")]
    pub consent_granted_values: Vec<String>,
    #[serde(default = "default_consent_denied_values")]
    pub consent_denied_values: Vec<String>,
    /// UA 中出现即判定为机器人的子串（不区分大小写）
    #[serde(default = "default_bot_markers")]
    pub bot_markers: Vec<String>,
    #[serde(default)]
    pub weighting: WeightingModel,
    #[serde(default = "default_time_decay_half_life_secs")]
    pub time_decay_half_life_secs: u64,
    /// 同意回传接口每 IP 每分钟请求上限
    #[serde(default = "default_consent_rate_limit")]
    pub consent_rate_limit_per_minute: u32,
}

/// 上报队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_attempts_per_round")]
    pub attempts_per_round: u32,
    #[serde(default = "default_attempt_delay_secs")]
    pub attempt_delay_secs: u64,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_round_delay_secs")]
    pub round_delay_secs: u64,
    /// 队列空闲时的兜底轮询间隔
    #[serde(default = "default_idle_poll_secs")]
    pub idle_poll_secs: u64,
}

/// 内置 reporter 配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportersConfig {
    /// 启用日志 reporter（仅输出到 tracing）
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_cpu_count() -> usize {
    num_cpus::get()
}

fn default_database_url() -> String {
    "clicktrail.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_prefix() -> String {
    "/go".to_string()
}

fn default_id_param() -> String {
    "trk".to_string()
}

fn default_site_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_cookie_secure() -> bool {
    true
}

fn default_session_cookie() -> String {
    "ct_clicks".to_string()
}

fn default_dedup_cookie() -> String {
    "ct_conv".to_string()
}

fn default_deferred_cookie() -> String {
    "ct_pending".to_string()
}

fn default_session_lifetime_days() -> u64 {
    90
}

fn default_session_max_entries() -> usize {
    50
}

fn default_consent() -> ConsentState {
    ConsentState::Granted
}

fn default_consent_granted_values() -> Vec<String> {
    ["granted", "allow", "yes", "true", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_consent_denied_values() -> Vec<String> {
    ["denied", "deny", "no", "false", "0"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_bot_markers() -> Vec<String> {
    [
        "bot",
        "spider",
        "crawl",
        "slurp",
        "headless",
        "lighthouse",
        "preview",
        "curl/",
        "wget/",
        "python-requests",
        "go-http-client",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_time_decay_half_life_secs() -> u64 {
    7 * 24 * 3600
}

fn default_consent_rate_limit() -> u32 {
    10
}

fn default_batch_size() -> u64 {
    20
}

fn default_attempts_per_round() -> u32 {
    3
}

fn default_attempt_delay_secs() -> u64 {
    60
}

fn default_max_rounds() -> u32 {
    3
}

fn default_round_delay_secs() -> u64 {
    3600
}

fn default_idle_poll_secs() -> u64 {
    300
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            cpu_count: default_cpu_count(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            id_param: default_id_param(),
            site_url: default_site_url(),
            fallback_url: None,
            secret: String::new(),
            cookie_secure: default_cookie_secure(),
            session_cookie: default_session_cookie(),
            dedup_cookie: default_dedup_cookie(),
            deferred_cookie: default_deferred_cookie(),
            session_lifetime_days: default_session_lifetime_days(),
            session_max_entries: default_session_max_entries(),
            click_dedup_window_secs: 0,
            conversion_dedup_window_secs: 0,
            deferred_transport: DeferredTransport::default(),
            redirect_mode: RedirectMode::default(),
            default_consent: default_consent(),
            consent_cookie: None,
            consent_granted_values: default_consent_granted_values(),
            consent_denied_values: default_consent_denied_values(),
            bot_markers: default_bot_markers(),
            weighting: WeightingModel::default(),
            time_decay_half_life_secs: default_time_decay_half_life_secs(),
            consent_rate_limit_per_minute: default_consent_rate_limit(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            attempts_per_round: default_attempts_per_round(),
            attempt_delay_secs: default_attempt_delay_secs(),
            max_rounds: default_max_rounds(),
            round_delay_secs: default_round_delay_secs(),
            idle_poll_secs: default_idle_poll_secs(),
        }
    }
}
