//! 上报队列表
//!
//! report_jobs 保存待投递给下游 reporter 的归因结果，
//! 状态机：pending -> processing -> done | pending(重试) | failed

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportJobs::Reporter).string_len(100).not_null())
                    .col(ColumnDef::new(ReportJobs::Payload).text().not_null())
                    .col(
                        ColumnDef::new(ReportJobs::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(ReportJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ReportJobs::Label).string_len(255).null())
                    .col(
                        ColumnDef::new(ReportJobs::AttemptsPerRound)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportJobs::AttemptDelaySecs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReportJobs::MaxRounds).integer().not_null())
                    .col(
                        ColumnDef::new(ReportJobs::RoundDelaySecs)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportJobs::RetryAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ReportJobs::LastError).text().null())
                    .col(ColumnDef::new(ReportJobs::ClaimToken).string_len(36).null())
                    .col(
                        ColumnDef::new(ReportJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReportJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // dequeue 按 (status, retry_after, created_at) 扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_report_jobs_ready")
                    .table(ReportJobs::Table)
                    .col(ReportJobs::Status)
                    .col(ReportJobs::RetryAfter)
                    .col(ReportJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_report_jobs_claim")
                    .table(ReportJobs::Table)
                    .col(ReportJobs::ClaimToken)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_report_jobs_claim").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_report_jobs_ready").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ReportJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReportJobs {
    #[sea_orm(iden = "report_jobs")]
    Table,
    Id,
    Reporter,
    Payload,
    Status,
    Attempts,
    Label,
    AttemptsPerRound,
    AttemptDelaySecs,
    MaxRounds,
    RoundDelaySecs,
    RetryAfter,
    LastError,
    ClaimToken,
    CreatedAt,
    UpdatedAt,
}
