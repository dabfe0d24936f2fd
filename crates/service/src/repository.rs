//! Persistence ports used by the marketplace services.
//!
//! Adapters live under [`crate::repo`]: an in-memory one for tests and
//! single-process runs, and a sea-orm one for Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::domain::{
    BidStatus, RatingSummary, RequestStatus, Review, ServiceCategory, ServiceRequest, Urgency, UserAccount,
};
use crate::errors::MarketError;

/// Filters servians apply when browsing open requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenRequestFilter {
    pub category: Option<ServiceCategory>,
    pub urgency: Option<Urgency>,
    /// Keep requests whose budget max is at least this much.
    pub min_budget: Option<i64>,
}

impl OpenRequestFilter {
    pub fn matches(&self, request: &ServiceRequest) -> bool {
        request.status == RequestStatus::Active
            && self.category.map_or(true, |c| request.service_category == c)
            && self.urgency.map_or(true, |u| request.urgency == u)
            && self.min_budget.map_or(true, |b| request.budget.max >= b)
    }
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), MarketError>;
    async fn get(&self, id: Uuid) -> Result<Option<ServiceRequest>, MarketError>;
    /// Store `next` only if the stored version still equals `expected`; the
    /// stored version becomes `expected + 1`. Returns `false` when another
    /// writer got there first or the row is gone. `views` is never overwritten.
    async fn compare_and_swap(&self, expected: i64, next: &ServiceRequest) -> Result<bool, MarketError>;
    /// Bump the informational view counter without touching the version.
    async fn increment_views(&self, id: Uuid) -> Result<(), MarketError>;
    /// Newest first.
    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<RequestStatus>,
        page: Pagination,
    ) -> Result<Page<ServiceRequest>, MarketError>;
    /// `(status, total_bids)` for every request the customer owns.
    async fn status_summary(&self, customer_id: Uuid) -> Result<Vec<(RequestStatus, u32)>, MarketError>;
    /// ACTIVE requests, most urgent first, then newest first.
    async fn list_open(&self, filter: &OpenRequestFilter, page: Pagination) -> Result<Page<ServiceRequest>, MarketError>;
    async fn list_by_servian_bids(
        &self,
        servian_id: Uuid,
        bid_status: Option<BidStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError>;
    async fn list_awarded_to(
        &self,
        servian_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError>;
    /// ACTIVE requests without bids created at or before `cutoff`.
    async fn find_close_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, MarketError>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Atomically count one creation against the customer's window starting at
    /// `window_start`, resetting the counter when the stored window is older.
    /// Returns the new count, or `None` when `cap` is already reached.
    async fn reserve(&self, customer_id: Uuid, window_start: DateTime<Utc>, cap: Option<u32>) -> Result<Option<u32>, MarketError>;
    /// Give back one slot of the given window, if it is still current.
    async fn release(&self, customer_id: Uuid, window_start: DateTime<Utc>) -> Result<(), MarketError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Fails with `AlreadyReviewed` when the request already has a review.
    async fn insert(&self, review: &Review) -> Result<(), MarketError>;
    /// Drop the review of a request whose reviewed flag could not be committed.
    async fn remove_for_request(&self, request_id: Uuid) -> Result<(), MarketError>;
    /// Every rating ever given to the servian.
    async fn ratings_for(&self, servian_id: Uuid) -> Result<Vec<u8>, MarketError>;
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<UserAccount>, MarketError>;
    /// Create or replace an account. A stored servian's rating fields are kept
    /// as they are, whatever `account` carries.
    async fn upsert(&self, account: &UserAccount) -> Result<(), MarketError>;
    /// Overwrite the servian's aggregate rating, creating a bare servian
    /// account when none exists yet. Reviews are append-only, so a summary
    /// counting fewer reviews than the stored one is stale and is ignored.
    async fn store_rating(&self, servian_id: Uuid, summary: RatingSummary, now: DateTime<Utc>) -> Result<(), MarketError>;
}
