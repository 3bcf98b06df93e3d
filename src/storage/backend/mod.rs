//! SeaORM storage backend
//!
//! Database storage for tracking definitions, click/conversion records and
//! the report queue, supporting SQLite, MySQL/MariaDB, and PostgreSQL.

mod clicks;
mod connection;
mod conversions;
mod converters;
mod definitions;
mod jobs;
pub mod retry;

use std::time::Duration;

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{ClicktrailError, Result};
use crate::storage::models::TrackingDefinition;

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{model_to_click, model_to_definition, model_to_job};

/// 定义缓存 TTL：定义不可变，TTL 只约束删除/停用后的可见延迟
const DEFINITION_CACHE_TTL_SECS: u64 = 60;
const DEFINITION_CACHE_CAPACITY: u64 = 10_000;

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(ClicktrailError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
#[derive(Clone, Debug)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    /// 定义查询缓存，None 表示不存在（负缓存）
    definition_cache: Cache<String, Option<TrackingDefinition>>,
    retry_config: retry::RetryConfig,
}

impl SeaOrmStorage {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let database_url = config.database_url.as_str();
        if database_url.is_empty() {
            return Err(ClicktrailError::database_config("database_url 未设置"));
        }

        let backend_name = infer_backend_from_url(database_url)?;
        let db = if backend_name == "sqlite" {
            connect_sqlite(database_url).await?
        } else {
            connect_generic(database_url, &backend_name, config.pool_size).await?
        };

        run_migrations(&db).await?;

        let storage = Self::from_connection(db, &backend_name, retry::RetryConfig::from(config));
        info!("{} storage initialized", backend_name.to_uppercase());
        Ok(storage)
    }

    /// 包装已建立（且已迁移）的连接
    pub fn from_connection(
        db: DatabaseConnection,
        backend_name: &str,
        retry_config: retry::RetryConfig,
    ) -> Self {
        Self {
            db,
            backend_name: backend_name.to_string(),
            definition_cache: Cache::builder()
                .time_to_live(Duration::from_secs(DEFINITION_CACHE_TTL_SECS))
                .max_capacity(DEFINITION_CACHE_CAPACITY)
                .build(),
            retry_config,
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// 获取数据库连接
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 连通性检查（健康检查使用）
    pub async fn ping(&self) -> Result<()> {
        self.db
            .ping()
            .await
            .map_err(|e| ClicktrailError::database_connection(e.to_string()))
    }
}
