//! Create duty chart table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DutyChart::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DutyChart::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DutyChart::EventName).string_len(256).not_null())
                    .col(ColumnDef::new(DutyChart::Title).string_len(256))
                    .col(ColumnDef::new(DutyChart::Date).date().not_null())
                    .col(ColumnDef::new(DutyChart::ReportingTime).string_len(32).not_null())
                    .col(ColumnDef::new(DutyChart::DressCode).string_len(256).not_null())
                    .col(ColumnDef::new(DutyChart::InCharge).json_binary().not_null())
                    .col(ColumnDef::new(DutyChart::Captain).json_binary())
                    .col(ColumnDef::new(DutyChart::ViceCaptain).json_binary())
                    .col(
                        ColumnDef::new(DutyChart::Assignments)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(ColumnDef::new(DutyChart::Remarks).text())
                    .col(ColumnDef::new(DutyChart::CreatedBy).string_len(32).not_null())
                    .col(
                        ColumnDef::new(DutyChart::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(DutyChart::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_duty_chart_created_by")
                            .from(DutyChart::Table, DutyChart::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: date (date-range listing)
        manager
            .create_index(
                Index::create()
                    .name("idx_duty_chart_date")
                    .table(DutyChart::Table)
                    .col(DutyChart::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DutyChart::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DutyChart {
    Table,
    Id,
    EventName,
    Title,
    Date,
    ReportingTime,
    DressCode,
    InCharge,
    Captain,
    ViceCaptain,
    Assignments,
    Remarks,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
