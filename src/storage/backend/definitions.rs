//! Tracking definition lookups
//!
//! Definitions are read-only reference data for the engine; the only write
//! path is `insert_definition`, used by the operator CLI and tests.

use std::collections::HashMap;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::{debug, error};

use super::converters::{definition_to_active_model, model_to_definition};
use super::{SeaOrmStorage, retry};
use crate::errors::{ClicktrailError, Result};
use crate::storage::models::TrackingDefinition;

use migration::entities::tracking_definition;

impl SeaOrmStorage {
    /// 按标识符查询定义（经 moka 缓存，含负缓存）
    pub async fn get_definition(&self, id: &str) -> Result<Option<TrackingDefinition>> {
        if let Some(cached) = self.definition_cache.get(id).await {
            return Ok(cached);
        }

        let db = &self.db;
        let id_owned = id.to_string();
        let found = retry::with_retry("get_definition", self.retry_config, || async {
            tracking_definition::Entity::find_by_id(id_owned.clone())
                .one(db)
                .await
        })
        .await
        .map_err(|e| {
            error!("查询追踪定义失败 {}: {}", id, e);
            ClicktrailError::database_operation(format!("查询追踪定义失败: {}", e))
        })?
        .map(model_to_definition);

        self.definition_cache
            .insert(id.to_string(), found.clone())
            .await;
        Ok(found)
    }

    /// 查询处于激活状态的定义
    pub async fn get_active_definition(&self, id: &str) -> Result<Option<TrackingDefinition>> {
        Ok(self.get_definition(id).await?.filter(|d| d.active))
    }

    /// 批量查询激活定义，返回 id → 定义
    pub async fn get_active_definitions(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TrackingDefinition>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let db = &self.db;
        let models = retry::with_retry("get_active_definitions", self.retry_config, || async {
            tracking_definition::Entity::find()
                .filter(tracking_definition::Column::Id.is_in(ids.iter().cloned()))
                .filter(tracking_definition::Column::Active.eq(true))
                .all(db)
                .await
        })
        .await
        .map_err(|e| {
            ClicktrailError::database_operation(format!("批量查询追踪定义失败: {}", e))
        })?;

        debug!(
            "Resolved {} active definitions out of {} ids",
            models.len(),
            ids.len()
        );
        Ok(models
            .into_iter()
            .map(|m| (m.id.clone(), model_to_definition(m)))
            .collect())
    }

    /// 写入新定义
    pub async fn insert_definition(&self, definition: &TrackingDefinition) -> Result<()> {
        let db = &self.db;
        retry::with_retry("insert_definition", self.retry_config, || async {
            tracking_definition::Entity::insert(definition_to_active_model(definition))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("写入追踪定义失败: {}", e)))?;

        self.definition_cache.invalidate(&definition.id).await;
        Ok(())
    }

    /// 停用定义（引擎视其为不存在）
    pub async fn deactivate_definition(&self, id: &str) -> Result<()> {
        use sea_orm::sea_query::Expr;

        let db = &self.db;
        let result = retry::with_retry("deactivate_definition", self.retry_config, || async {
            tracking_definition::Entity::update_many()
                .col_expr(tracking_definition::Column::Active, Expr::value(false))
                .filter(tracking_definition::Column::Id.eq(id))
                .exec(db)
                .await
        })
        .await
        .map_err(|e| ClicktrailError::database_operation(format!("停用追踪定义失败: {}", e)))?;

        self.definition_cache.invalidate(id).await;
        if result.rows_affected == 0 {
            return Err(ClicktrailError::not_found(format!("追踪定义不存在: {}", id)));
        }
        Ok(())
    }
}
