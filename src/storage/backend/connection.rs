use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::errors::{ClicktrailError, Result};
use migration::{Migrator, MigratorTrait};

/// 连接 SQLite 数据库（带自动创建和 WAL 优化）
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let url = normalize_sqlite_url(database_url);
    let opt = SqliteConnectOptions::from_str(&url)
        .map_err(|e| ClicktrailError::database_config(format!("SQLite URL 解析失败: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(true)
        .pragma("cache_size", "-16000")
        .pragma("temp_store", "memory");

    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        ClicktrailError::database_connection(format!("无法连接到 SQLite 数据库: {}", e))
    })?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// 裸文件路径补上 sqlite:// 前缀
fn normalize_sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite://{}", database_url)
    }
}

/// 连接通用数据库（MySQL/PostgreSQL）
pub async fn connect_generic(
    database_url: &str,
    backend_name: &str,
    pool_size: u32,
) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(pool_size)
        .min_connections(pool_size.min(5))
        .connect_timeout(std::time::Duration::from_secs(8))
        .acquire_timeout(std::time::Duration::from_secs(8))
        .idle_timeout(std::time::Duration::from_secs(300))
        .max_lifetime(std::time::Duration::from_secs(3600))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        ClicktrailError::database_connection(format!(
            "无法连接到 {} 数据库: {}",
            backend_name.to_uppercase(),
            e
        ))
    })
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("迁移失败: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
