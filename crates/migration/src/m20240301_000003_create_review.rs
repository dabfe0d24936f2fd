//! Create `review` table.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Review::Table)
                    .if_not_exists()
                    .col(uuid(Review::Id).primary_key())
                    .col(uuid(Review::RequestId))
                    .col(uuid(Review::ReviewerId))
                    .col(uuid(Review::RevieweeId))
                    .col(small_integer(Review::Rating))
                    .col(text(Review::Comment))
                    .col(string_len(Review::Role, 16))
                    .col(timestamp_with_time_zone(Review::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_review_request")
                            .from(Review::Table, Review::RequestId)
                            .to(ServiceRequest::Table, ServiceRequest::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Review::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Review {
    Table,
    Id,
    RequestId,
    ReviewerId,
    RevieweeId,
    Rating,
    Comment,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ServiceRequest { Table, Id }
