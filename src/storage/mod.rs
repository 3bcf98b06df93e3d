use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::errors::Result;

pub mod backend;
pub mod models;

pub use backend::SeaOrmStorage;
pub use models::{
    CampaignDimensions, ClickRecord, ConversionRecord, JobStatus, NewClick, NewJob,
    PendingOutlook, QueueJob, QueueStats, RetryPolicy, TrackingDefinition,
};

pub struct StorageFactory;

impl StorageFactory {
    /// 按配置创建存储（数据库类型从 URL 推断，自动运行迁移）
    pub async fn create(config: &DatabaseConfig) -> Result<Arc<SeaOrmStorage>> {
        let storage = SeaOrmStorage::new(config).await?;
        Ok(Arc::new(storage))
    }
}
