//! Create `notification` table.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(uuid(Notification::Id).primary_key())
                    .col(uuid(Notification::RecipientId))
                    .col(string_len(Notification::Kind, 32))
                    .col(string_len(Notification::Title, 128))
                    .col(text(Notification::Message))
                    .col(uuid_null(Notification::RequestId))
                    .col(boolean(Notification::Read).default(false))
                    .col(timestamp_with_time_zone(Notification::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Notification::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Notification {
    Table,
    Id,
    RecipientId,
    Kind,
    Title,
    Message,
    RequestId,
    Read,
    CreatedAt,
}
