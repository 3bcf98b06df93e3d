//! Report queue job entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "report_jobs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub reporter: String,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// pending | processing | done | failed
    pub status: String,
    pub attempts: i32,
    pub label: Option<String>,
    pub attempts_per_round: i32,
    pub attempt_delay_secs: i64,
    pub max_rounds: i32,
    pub round_delay_secs: i64,
    pub retry_after: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    /// Set by dequeue when a drain pass claims the job
    pub claim_token: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
