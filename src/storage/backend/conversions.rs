//! Conversion record persistence
//!
//! 一次转化的所有归因记录在同一事务内写入，任一失败整体回滚

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use tracing::{error, warn};

use super::SeaOrmStorage;
use super::clicks::latest_click_on;
use super::converters::{conversion_to_active_model, model_to_conversion};
use crate::errors::{ClicktrailError, Result};
use crate::storage::models::ConversionRecord;

use migration::entities::conversion_record;

impl SeaOrmStorage {
    /// 写入一次转化的归因记录
    ///
    /// 每个权重 > 0 的标识符写一行，关联到该标识符最近一次点击。
    /// 任一标识符没有点击记录或写入失败都会回滚整个事务。
    pub async fn record_conversion(
        &self,
        weights: &[(String, f64)],
        converted_at: DateTime<Utc>,
    ) -> Result<Vec<ConversionRecord>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ClicktrailError::transaction(format!("开始事务失败: {}", e)))?;

        match Self::insert_conversion_rows(&txn, weights, converted_at).await {
            Ok(records) => {
                txn.commit()
                    .await
                    .map_err(|e| ClicktrailError::transaction(format!("提交事务失败: {}", e)))?;
                Ok(records)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!("回滚转化事务失败: {}", rollback_err);
                }
                warn!("转化记录写入已回滚: {}", e);
                Err(e)
            }
        }
    }

    async fn insert_conversion_rows(
        txn: &DatabaseTransaction,
        weights: &[(String, f64)],
        converted_at: DateTime<Utc>,
    ) -> Result<Vec<ConversionRecord>> {
        let mut records = Vec::new();

        for (tracking_id, value) in weights.iter().filter(|(_, w)| *w > 0.0) {
            let click = latest_click_on(txn, tracking_id)
                .await
                .map_err(|e| ClicktrailError::transaction(format!("查询点击失败: {}", e)))?
                .ok_or_else(|| {
                    ClicktrailError::transaction(format!("标识符 {} 没有点击记录", tracking_id))
                })?;

            let inserted = conversion_record::Entity::insert(conversion_to_active_model(
                click.id,
                tracking_id,
                *value,
                converted_at,
            ))
            .exec(txn)
            .await
            .map_err(|e| ClicktrailError::transaction(format!("写入转化记录失败: {}", e)))?;

            records.push(ConversionRecord {
                id: inserted.last_insert_id,
                click_id: click.id,
                tracking_id: tracking_id.clone(),
                value: *value,
                converted_at,
            });
        }

        Ok(records)
    }

    /// 某标识符的全部转化记录（按时间升序）
    pub async fn conversions_for(&self, tracking_id: &str) -> Result<Vec<ConversionRecord>> {
        conversion_record::Entity::find()
            .filter(conversion_record::Column::TrackingId.eq(tracking_id))
            .order_by_asc(conversion_record::Column::ConvertedAt)
            .order_by_asc(conversion_record::Column::Id)
            .all(&self.db)
            .await
            .map(|models| models.into_iter().map(model_to_conversion).collect())
            .map_err(|e| ClicktrailError::database_operation(format!("查询转化记录失败: {}", e)))
    }

    /// 转化记录总数
    pub async fn count_conversions(&self) -> Result<u64> {
        conversion_record::Entity::find()
            .count(&self.db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("统计转化记录失败: {}", e)))
    }
}
