//! Create `request_quota` table: one counter row per customer and week.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RequestQuota::Table)
                    .if_not_exists()
                    .col(uuid(RequestQuota::CustomerId).primary_key())
                    .col(timestamp_with_time_zone(RequestQuota::WindowStart))
                    .col(integer(RequestQuota::Used).default(0))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(RequestQuota::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum RequestQuota {
    Table,
    CustomerId,
    WindowStart,
    Used,
}
