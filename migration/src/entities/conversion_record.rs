use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversion_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub click_id: i64,
    pub tracking_id: String,
    /// Fractional attribution value in (0.0, 1.0]
    pub value: f64,
    pub converted_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::click_record::Entity",
        from = "Column::ClickId",
        to = "super::click_record::Column::Id",
        on_delete = "Cascade"
    )]
    ClickRecord,
}

impl Related<super::click_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClickRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
