//! Marketplace service layer: request lifecycle, bidding, awards, reviews.
//! - Domain rules live on the aggregate in `domain`; services only orchestrate.
//! - Every state change goes through `commit::Committer` as one versioned write.
//! - Storage is reached through the traits in `repository`, with in-memory and
//!   SeaORM adapters in `repo`.

pub mod errors;
pub mod clock;
pub mod domain;
pub mod repository;
pub mod repo;
pub mod commit;
pub mod rate_limiter;
pub mod notify;
pub mod request_store;
pub mod bid_ledger;
pub mod award;
pub mod reviews;
pub mod profiles;
pub mod sweeper;
pub mod context;
#[cfg(test)]
pub mod test_support;

pub use context::{AppContext, Background, MarketSettings, Storage};
pub use errors::MarketError;
