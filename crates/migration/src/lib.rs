//! Migrator registering entity-specific migrations in dependency order.
//! Indexes are applied last.
pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_service_request;
mod m20240301_000002_create_request_quota;
mod m20240301_000003_create_review;
mod m20240301_000004_create_user_profile;
mod m20240301_000005_create_notification;
mod m20240301_000099_add_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_service_request::Migration),
            Box::new(m20240301_000002_create_request_quota::Migration),
            Box::new(m20240301_000003_create_review::Migration),
            Box::new(m20240301_000004_create_user_profile::Migration),
            Box::new(m20240301_000005_create_notification::Migration),
            // Indexes should always be applied last
            Box::new(m20240301_000099_add_indexes::Migration),
        ]
    }
}
