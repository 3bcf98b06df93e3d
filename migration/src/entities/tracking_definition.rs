use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tracking_definitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub destination_url: Option<String>,
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub content: Option<String>,
    pub term: Option<String>,
    pub active: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::click_record::Entity")]
    ClickRecord,
}

impl Related<super::click_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClickRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
