//! Click record persistence

use std::collections::HashMap;

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use tracing::debug;

use super::converters::{model_to_click, new_click_to_active_model};
use super::{SeaOrmStorage, retry};
use crate::errors::{ClicktrailError, Result};
use crate::storage::models::{ClickRecord, NewClick};

use migration::entities::click_record;

/// 在给定连接（或事务）上取某标识符最近一次点击
pub(super) async fn latest_click_on<C: ConnectionTrait>(
    conn: &C,
    tracking_id: &str,
) -> std::result::Result<Option<click_record::Model>, DbErr> {
    click_record::Entity::find()
        .filter(click_record::Column::TrackingId.eq(tracking_id))
        .order_by_desc(click_record::Column::ClickedAt)
        .order_by_desc(click_record::Column::Id)
        .one(conn)
        .await
}

impl SeaOrmStorage {
    /// 追加一条点击记录，返回带 id 的记录
    pub async fn insert_click(&self, click: &NewClick) -> Result<ClickRecord> {
        let db = &self.db;
        let inserted = retry::with_retry("insert_click", self.retry_config, || async {
            click_record::Entity::insert(new_click_to_active_model(click))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("写入点击记录失败: {}", e)))?;

        debug!(
            "Click recorded: id={} tracking_id={}",
            inserted.last_insert_id, click.tracking_id
        );
        Ok(ClickRecord {
            id: inserted.last_insert_id,
            tracking_id: click.tracking_id.clone(),
            clicked_at: click.clicked_at,
            dimensions: click.dimensions.clone(),
            platform_ids: click.platform_ids.clone(),
        })
    }

    /// 某标识符最近一次点击
    pub async fn latest_click(&self, tracking_id: &str) -> Result<Option<ClickRecord>> {
        let db = &self.db;
        retry::with_retry("latest_click", self.retry_config, || async {
            latest_click_on(db, tracking_id).await
        })
        .await
        .map(|m| m.map(model_to_click))
        .map_err(|e| ClicktrailError::database_operation(format!("查询点击记录失败: {}", e)))
    }

    /// 多个标识符各自最近一次点击（没有点击的标识符不出现在结果中）
    pub async fn latest_clicks(&self, tracking_ids: &[String]) -> Result<HashMap<String, ClickRecord>> {
        let mut result = HashMap::with_capacity(tracking_ids.len());
        for id in tracking_ids {
            if let Some(click) = self.latest_click(id).await? {
                result.insert(id.clone(), click);
            }
        }
        Ok(result)
    }

    /// 某标识符的点击总数
    pub async fn count_clicks(&self, tracking_id: &str) -> Result<u64> {
        click_record::Entity::find()
            .filter(click_record::Column::TrackingId.eq(tracking_id))
            .count(&self.db)
            .await
            .map_err(|e| ClicktrailError::database_operation(format!("统计点击失败: {}", e)))
    }
}
