//! Create miqaat table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Miqaat::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Miqaat::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Miqaat::Name).string_len(256).not_null())
                    .col(ColumnDef::new(Miqaat::Location).string_len(256).not_null())
                    .col(ColumnDef::new(Miqaat::Date).date().not_null())
                    .col(ColumnDef::new(Miqaat::StartTime).string_len(32))
                    .col(ColumnDef::new(Miqaat::Description).text())
                    .col(ColumnDef::new(Miqaat::CreatedBy).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Miqaat::Attendance)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'[]'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(Miqaat::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Miqaat::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_miqaat_created_by")
                            .from(Miqaat::Table, Miqaat::CreatedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: date (listing newest first)
        manager
            .create_index(
                Index::create()
                    .name("idx_miqaat_date")
                    .table(Miqaat::Table)
                    .col(Miqaat::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Miqaat::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Miqaat {
    Table,
    Id,
    Name,
    Location,
    Date,
    StartTime,
    Description,
    CreatedBy,
    Attendance,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
