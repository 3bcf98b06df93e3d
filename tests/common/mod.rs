//! 集成测试共享工具：临时 SQLite 存储、定义写入、引擎构建

#![allow(dead_code)]

use std::sync::Arc;

use actix_web::cookie::Cookie;
use chrono::Utc;
use tempfile::TempDir;

use clicktrail::config::{DatabaseConfig, StaticConfig};
use clicktrail::engine::Engine;
use clicktrail::storage::{SeaOrmStorage, StorageFactory, TrackingDefinition};
use clicktrail::tracking::RequestContext;
use clicktrail::utils::generate_tracking_id;

pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const BOT_UA: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// 临时目录与存储，目录随结构体一起释放
pub struct TestDb {
    _dir: TempDir,
    pub storage: Arc<SeaOrmStorage>,
}

pub async fn test_db() -> TestDb {
    let dir = TempDir::new().expect("创建临时目录失败");
    let db_path = dir.path().join("clicktrail_test.db");
    let config = DatabaseConfig {
        database_url: format!("sqlite://{}?mode=rwc", db_path.display()),
        ..Default::default()
    };
    let storage = StorageFactory::create(&config)
        .await
        .expect("创建存储失败");
    TestDb { _dir: dir, storage }
}

pub fn test_config() -> StaticConfig {
    let mut config = StaticConfig::default();
    config.tracking.secret = SECRET.to_string();
    config.tracking.site_url = "https://shop.example".to_string();
    config.tracking.cookie_secure = false;
    config
}

pub fn build_engine(config: &StaticConfig, storage: &Arc<SeaOrmStorage>) -> Engine {
    Engine::from_config(config, Arc::clone(storage)).expect("构建引擎失败")
}

pub async fn insert_definition(storage: &SeaOrmStorage, destination: Option<&str>) -> String {
    let definition = TrackingDefinition {
        id: generate_tracking_id(),
        destination_url: destination.map(str::to_string),
        source: "newsletter".to_string(),
        medium: "email".to_string(),
        campaign: "spring".to_string(),
        content: None,
        term: None,
        active: true,
        created_at: Utc::now(),
    };
    storage
        .insert_definition(&definition)
        .await
        .expect("写入定义失败");
    definition.id
}

/// 维度留空的定义，用于测试查询参数回填
pub async fn insert_blank_definition(storage: &SeaOrmStorage, destination: &str) -> String {
    let definition = TrackingDefinition {
        id: generate_tracking_id(),
        destination_url: Some(destination.to_string()),
        source: String::new(),
        medium: String::new(),
        campaign: String::new(),
        content: None,
        term: None,
        active: true,
        created_at: Utc::now(),
    };
    storage
        .insert_definition(&definition)
        .await
        .expect("写入定义失败");
    definition.id
}

pub fn browser(path: &str) -> RequestContext {
    RequestContext::new(path)
        .with_user_agent(BROWSER_UA)
        .with_ip("203.0.113.7")
}

/// 模拟浏览器：把响应中的 cookie 带到下一次请求
pub fn carry(mut ctx: RequestContext, cookies: &[Cookie<'static>]) -> RequestContext {
    for cookie in cookies {
        ctx = ctx.with_cookie(cookie.name(), cookie.value());
    }
    ctx
}
