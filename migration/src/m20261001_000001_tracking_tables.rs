//! 追踪定义 / 点击记录 / 转化记录表
//!
//! - tracking_definitions: 管理员创建的追踪定义（创建后不可变）
//! - click_records: 每次非机器人访问追踪链接的记录（仅追加）
//! - conversion_records: 每次归因转化的分数记录

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackingDefinitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackingDefinitions::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::DestinationUrl)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Source)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Medium)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Campaign)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Content)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Term)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(TrackingDefinitions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClickRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickRecords::TrackingId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickRecords::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickRecords::Source).string_len(255).null())
                    .col(ColumnDef::new(ClickRecords::Medium).string_len(255).null())
                    .col(
                        ColumnDef::new(ClickRecords::Campaign)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClickRecords::Content)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(ClickRecords::Term).string_len(255).null())
                    .col(ColumnDef::new(ClickRecords::PlatformIds).text().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_click_records_definition")
                            .from(ClickRecords::Table, ClickRecords::TrackingId)
                            .to(TrackingDefinitions::Table, TrackingDefinitions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // 归因时按 tracking_id 取最近一次点击
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_records_tracking_time")
                    .table(ClickRecords::Table)
                    .col(ClickRecords::TrackingId)
                    .col(ClickRecords::ClickedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ConversionRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConversionRecords::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ConversionRecords::ClickId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ConversionRecords::TrackingId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ConversionRecords::Value).double().not_null())
                    .col(
                        ColumnDef::new(ConversionRecords::ConvertedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversion_records_click")
                            .from(ConversionRecords::Table, ConversionRecords::ClickId)
                            .to(ClickRecords::Table, ClickRecords::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_conversion_records_tracking")
                    .table(ConversionRecords::Table)
                    .col(ConversionRecords::TrackingId)
                    .col(ConversionRecords::ConvertedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ConversionRecords::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ClickRecords::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(TrackingDefinitions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TrackingDefinitions {
    #[sea_orm(iden = "tracking_definitions")]
    Table,
    Id,
    DestinationUrl,
    Source,
    Medium,
    Campaign,
    Content,
    Term,
    Active,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ClickRecords {
    #[sea_orm(iden = "click_records")]
    Table,
    Id,
    TrackingId,
    ClickedAt,
    Source,
    Medium,
    Campaign,
    Content,
    Term,
    PlatformIds,
}

#[derive(DeriveIden)]
enum ConversionRecords {
    #[sea_orm(iden = "conversion_records")]
    Table,
    Id,
    ClickId,
    TrackingId,
    Value,
    ConvertedAt,
}
