//! Click record entity, one row per recorded (non-bot, non-repeat) visit

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "click_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tracking_id: String,
    pub clicked_at: DateTimeUtc,
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub term: Option<String>,
    /// Platform click identifiers (gclid, fbclid, ...) as a JSON object
    #[sea_orm(column_type = "Text", nullable)]
    pub platform_ids: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tracking_definition::Entity",
        from = "Column::TrackingId",
        to = "super::tracking_definition::Column::Id",
        on_delete = "Cascade"
    )]
    TrackingDefinition,
    #[sea_orm(has_many = "super::conversion_record::Entity")]
    ConversionRecord,
}

impl Related<super::tracking_definition::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TrackingDefinition.def()
    }
}

impl Related<super::conversion_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConversionRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
