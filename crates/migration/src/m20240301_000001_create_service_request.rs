//! Create `service_request` table.
//!
//! Bids are embedded as a jsonb array so a request and its bids are written
//! together under a single version check.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceRequest::Table)
                    .if_not_exists()
                    .col(uuid(ServiceRequest::Id).primary_key())
                    .col(uuid(ServiceRequest::CustomerId))
                    .col(string_len(ServiceRequest::Title, 100))
                    .col(text(ServiceRequest::Description))
                    .col(string_len(ServiceRequest::ServiceCategory, 32))
                    .col(json_binary(ServiceRequest::Location))
                    .col(string_len(ServiceRequest::Urgency, 16))
                    .col(small_integer(ServiceRequest::UrgencyRank))
                    .col(timestamp_with_time_zone_null(ServiceRequest::PreferredDate))
                    .col(big_integer(ServiceRequest::BudgetMin))
                    .col(big_integer(ServiceRequest::BudgetMax))
                    .col(json_binary(ServiceRequest::Images))
                    .col(string_len(ServiceRequest::Status, 16))
                    .col(json_binary(ServiceRequest::Bids))
                    .col(uuid_null(ServiceRequest::AwardedServian))
                    .col(integer(ServiceRequest::TotalBids).default(0))
                    .col(big_integer(ServiceRequest::Views).default(0))
                    .col(json_binary_null(ServiceRequest::Review))
                    .col(big_integer(ServiceRequest::Version).default(0))
                    .col(timestamp_with_time_zone(ServiceRequest::CreatedAt))
                    .col(timestamp_with_time_zone(ServiceRequest::UpdatedAt))
                    .col(timestamp_with_time_zone_null(ServiceRequest::CancelledAt))
                    .col(timestamp_with_time_zone_null(ServiceRequest::CompletedAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ServiceRequest::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum ServiceRequest {
    Table,
    Id,
    CustomerId,
    Title,
    Description,
    ServiceCategory,
    Location,
    Urgency,
    UrgencyRank,
    PreferredDate,
    BudgetMin,
    BudgetMax,
    Images,
    Status,
    Bids,
    AwardedServian,
    TotalBids,
    Views,
    Review,
    Version,
    CreatedAt,
    UpdatedAt,
    CancelledAt,
    CompletedAt,
}
