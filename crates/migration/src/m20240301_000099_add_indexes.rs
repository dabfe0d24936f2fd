use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ServiceRequest: customer dashboards
        manager
            .create_index(
                Index::create()
                    .name("idx_request_customer")
                    .table(ServiceRequest::Table)
                    .col(ServiceRequest::CustomerId)
                    .to_owned(),
            )
            .await?;

        // ServiceRequest: open listings and the expiry sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_request_status_created")
                    .table(ServiceRequest::Table)
                    .col(ServiceRequest::Status)
                    .col(ServiceRequest::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_request_awarded")
                    .table(ServiceRequest::Table)
                    .col(ServiceRequest::AwardedServian)
                    .to_owned(),
            )
            .await?;

        // Review: at most one per request
        manager
            .create_index(
                Index::create()
                    .name("uniq_review_request")
                    .table(Review::Table)
                    .col(Review::RequestId)
                    .unique()
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_review_reviewee")
                    .table(Review::Table)
                    .col(Review::RevieweeId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_recipient")
                    .table(Notification::Table)
                    .col(Notification::RecipientId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_request_customer").table(ServiceRequest::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_request_status_created").table(ServiceRequest::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_request_awarded").table(ServiceRequest::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uniq_review_request").table(Review::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_review_reviewee").table(Review::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_notification_recipient").table(Notification::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceRequest { Table, CustomerId, Status, CreatedAt, AwardedServian }

#[derive(DeriveIden)]
enum Review { Table, RequestId, RevieweeId }

#[derive(DeriveIden)]
enum Notification { Table, RecipientId }
