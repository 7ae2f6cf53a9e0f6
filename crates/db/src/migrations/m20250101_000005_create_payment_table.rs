//! Create payment table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payment::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payment::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Payment::MemberId).string_len(32).not_null())
                    .col(ColumnDef::new(Payment::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Payment::PaymentType).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Payment::Status)
                            .string_len(16)
                            .not_null()
                            .default("Pending"),
                    )
                    .col(ColumnDef::new(Payment::SubscriptionYear).string_len(16))
                    .col(ColumnDef::new(Payment::DueDate).date().not_null())
                    .col(ColumnDef::new(Payment::PaidDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Payment::ReceiptNumber).string_len(64).unique_key())
                    .col(ColumnDef::new(Payment::PaymentMethod).string_len(64))
                    .col(ColumnDef::new(Payment::Notes).text())
                    .col(ColumnDef::new(Payment::RecordedBy).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Payment::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Payment::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payment_member")
                            .from(Payment::Table, Payment::MemberId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: member_id (per-member history)
        manager
            .create_index(
                Index::create()
                    .name("idx_payment_member_id")
                    .table(Payment::Table)
                    .col(Payment::MemberId)
                    .to_owned(),
            )
            .await?;

        // Index: (member_id, subscription_year) (annual sweep lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_payment_member_year")
                    .table(Payment::Table)
                    .col(Payment::MemberId)
                    .col(Payment::SubscriptionYear)
                    .to_owned(),
            )
            .await?;

        // Index: status (overview aggregation)
        manager
            .create_index(
                Index::create()
                    .name("idx_payment_status")
                    .table(Payment::Table)
                    .col(Payment::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payment::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Payment {
    Table,
    Id,
    MemberId,
    Amount,
    PaymentType,
    Status,
    SubscriptionYear,
    DueDate,
    PaidDate,
    ReceiptNumber,
    PaymentMethod,
    Notes,
    RecordedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
