pub mod memory;
pub mod seaorm;

pub use memory::{InMemoryProfileRepository, InMemoryQuotaStore, InMemoryRequestRepository, InMemoryReviewRepository};
pub use seaorm::{SeaOrmNotificationSink, SeaOrmProfileRepository, SeaOrmQuotaStore, SeaOrmRequestRepository, SeaOrmReviewRepository};
