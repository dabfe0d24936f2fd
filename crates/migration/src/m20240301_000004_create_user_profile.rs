//! Create `user_profile` table.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserProfile::Table)
                    .if_not_exists()
                    .col(uuid(UserProfile::Id).primary_key())
                    .col(string_len(UserProfile::Email, 255))
                    .col(string_len(UserProfile::Name, 255))
                    .col(string_len(UserProfile::Role, 16))
                    .col(json_binary(UserProfile::Profile))
                    .col(timestamp_with_time_zone(UserProfile::CreatedAt))
                    .col(timestamp_with_time_zone(UserProfile::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(UserProfile::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum UserProfile {
    Table,
    Id,
    Email,
    Name,
    Role,
    Profile,
    CreatedAt,
    UpdatedAt,
}
