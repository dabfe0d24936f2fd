//! Request lifecycle entry points: creation, reads, edits and listings.

use std::sync::Arc;

use chrono::Duration;
use common::pagination::{Page, PageInfo, Pagination};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::award::close_one;
use crate::clock::Clock;
use crate::commit::Committer;
use crate::context::MarketSettings;
use crate::domain::{
    Actor, Bid, BidStatus, NewRequest, RequestPatch, RequestStatus, RequestView, Role, ServiceCategory, ServiceRequest,
};
use crate::errors::MarketError;
use crate::rate_limiter::RateLimiter;
use crate::repository::{OpenRequestFilter, ProfileRepository, RequestRepository};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStats {
    pub total_requests: u32,
    pub active: u32,
    pub awarded: u32,
    pub completed: u32,
    pub cancelled: u32,
    pub closed: u32,
    pub total_bids_received: u32,
}

/// One of a servian's bids together with the request it was placed on.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServianBidView {
    pub request_id: Uuid,
    pub title: String,
    pub service_category: ServiceCategory,
    pub request_status: RequestStatus,
    pub bid: Bid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServianStats {
    pub total_bids: u32,
    pub pending: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub withdrawn: u32,
    pub jobs_awarded: u32,
    pub jobs_completed: u32,
}

#[derive(Clone)]
pub struct RequestStore {
    requests: Arc<dyn RequestRepository>,
    profiles: Arc<dyn ProfileRepository>,
    limiter: RateLimiter,
    committer: Committer,
    clock: Arc<dyn Clock>,
    settings: MarketSettings,
}

impl RequestStore {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        profiles: Arc<dyn ProfileRepository>,
        limiter: RateLimiter,
        committer: Committer,
        clock: Arc<dyn Clock>,
        settings: MarketSettings,
    ) -> Self {
        Self { requests, profiles, limiter, committer, clock, settings }
    }

    fn view(&self, request: ServiceRequest) -> RequestView {
        RequestView::new(request, self.clock.now(), self.settings.auto_close_days)
    }

    /// Close the request now if its bidding window lapsed without bids.
    async fn settle(&self, request: ServiceRequest) -> Result<ServiceRequest, MarketError> {
        if !request.is_close_eligible(self.clock.now(), self.settings.auto_close_days) {
            return Ok(request);
        }
        match close_one(&self.committer, request.id, self.settings.auto_close_days).await? {
            Some(closed) => Ok(closed),
            // someone bid or closed it first
            None => self
                .requests
                .get(request.id)
                .await?
                .ok_or_else(|| MarketError::not_found("service request")),
        }
    }

    /// Create a request after validating it and taking a weekly quota slot.
    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn create(&self, customer_id: Uuid, input: NewRequest) -> Result<ServiceRequest, MarketError> {
        let request = ServiceRequest::open(customer_id, input, self.clock.now())?;
        let tier = self
            .profiles
            .get(customer_id)
            .await?
            .and_then(|a| a.tier())
            .unwrap_or_default();
        let reservation = self.limiter.check_and_reserve(customer_id, tier).await?;

        if let Err(e) = self.requests.insert(&request).await {
            if let Err(release_err) = self.limiter.release(&reservation).await {
                warn!(error = %release_err, "failed to release quota slot after insert failure");
            }
            return Err(e);
        }
        info!(
            event = "request_created",
            request_id = %request.id,
            category = request.service_category.as_str(),
            quota_used = reservation.used,
            "service request created"
        );
        Ok(request)
    }

    /// Fetch one request as seen by `actor`.
    ///
    /// Customers only see their own requests. Servians see ACTIVE requests
    /// and requests they bid on, with competing bids hidden; each servian
    /// fetch counts as a view.
    #[instrument(skip(self), fields(request_id = %id, actor_id = %actor.id))]
    pub async fn get(&self, actor: Actor, id: Uuid) -> Result<RequestView, MarketError> {
        let request = self
            .requests
            .get(id)
            .await?
            .ok_or_else(|| MarketError::not_found("service request"))?;
        let mut request = self.settle(request).await?;

        match actor.role {
            Role::Customer => {
                if request.customer_id != actor.id {
                    return Err(MarketError::Authorization);
                }
                Ok(self.view(request))
            }
            Role::Servian => {
                let has_bid = request.bid_by_servian(actor.id).is_some();
                if request.status != RequestStatus::Active && !has_bid && request.awarded_servian != Some(actor.id) {
                    return Err(MarketError::Authorization);
                }
                self.requests.increment_views(id).await?;
                request.views += 1;
                Ok(self.view(request.visible_to_servian(actor.id)))
            }
        }
    }

    #[instrument(skip(self, patch), fields(request_id = %id, customer_id = %customer_id))]
    pub async fn update(&self, customer_id: Uuid, id: Uuid, patch: RequestPatch) -> Result<RequestView, MarketError> {
        let (request, ()) = self
            .committer
            .apply(id, |r, now| r.apply_update(customer_id, patch.clone(), now))
            .await?;
        info!(event = "request_updated", request_id = %id, version = request.version, "service request updated");
        Ok(self.view(request))
    }

    pub async fn list_for_customer(
        &self,
        customer_id: Uuid,
        status: Option<RequestStatus>,
        page: Pagination,
    ) -> Result<Page<RequestView>, MarketError> {
        let page = self.requests.list_by_customer(customer_id, status, page).await?;
        let mut items = Vec::with_capacity(page.items.len());
        for request in page.items {
            items.push(self.view(self.settle(request).await?));
        }
        Ok(Page { items, pagination: page.pagination })
    }

    pub async fn customer_stats(&self, customer_id: Uuid) -> Result<CustomerStats, MarketError> {
        let rows = self.requests.status_summary(customer_id).await?;
        let mut stats = CustomerStats::default();
        for (status, bids) in rows {
            stats.total_requests += 1;
            stats.total_bids_received += bids;
            match status {
                RequestStatus::Active => stats.active += 1,
                RequestStatus::Awarded => stats.awarded += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Cancelled => stats.cancelled += 1,
                RequestStatus::Closed => stats.closed += 1,
            }
        }
        Ok(stats)
    }

    /// ACTIVE requests for servians to browse, most urgent first.
    #[instrument(skip(self, filter), fields(servian_id = %servian_id))]
    /// ACTIVE requests a servian can bid on. Expired ones are closed before the
    /// page is read, so neither the items nor the total include them.
    pub async fn list_open(
        &self,
        servian_id: Uuid,
        filter: OpenRequestFilter,
        paging: Pagination,
    ) -> Result<Page<RequestView>, MarketError> {
        let now = self.clock.now();
        let days = self.settings.auto_close_days;
        let cutoff = now - Duration::days(days);
        for id in self.requests.find_close_candidates(cutoff).await? {
            close_one(&self.committer, id, days).await?;
        }

        let page = self.requests.list_open(&filter, paging).await?;
        let mut items = Vec::with_capacity(page.items.len());
        let mut dropped = 0u64;
        for request in page.items {
            let request = self.settle(request).await?;
            if request.status == RequestStatus::Active {
                items.push(RequestView::new(request.visible_to_servian(servian_id), now, days));
            } else {
                dropped += 1;
            }
        }
        let pagination = if dropped == 0 {
            page.pagination
        } else {
            PageInfo::new(paging, page.pagination.total.saturating_sub(dropped))
        };
        Ok(Page { items, pagination })
    }

    pub async fn servian_bids(&self, servian_id: Uuid, status: Option<BidStatus>) -> Result<Vec<ServianBidView>, MarketError> {
        let requests = self.requests.list_by_servian_bids(servian_id, status).await?;
        Ok(requests
            .into_iter()
            .filter_map(|r| {
                let bid = r.bid_by_servian(servian_id)?.clone();
                Some(ServianBidView {
                    request_id: r.id,
                    title: r.title,
                    service_category: r.service_category,
                    request_status: r.status,
                    bid,
                })
            })
            .collect())
    }

    /// Requests awarded to the servian.
    pub async fn servian_jobs(&self, servian_id: Uuid, status: Option<RequestStatus>) -> Result<Vec<RequestView>, MarketError> {
        let jobs = self.requests.list_awarded_to(servian_id, status).await?;
        Ok(jobs.into_iter().map(|r| self.view(r.visible_to_servian(servian_id))).collect())
    }

    pub async fn servian_stats(&self, servian_id: Uuid) -> Result<ServianStats, MarketError> {
        let mut stats = ServianStats::default();
        for r in self.requests.list_by_servian_bids(servian_id, None).await? {
            let Some(bid) = r.bid_by_servian(servian_id) else { continue };
            stats.total_bids += 1;
            match bid.status {
                BidStatus::Pending => stats.pending += 1,
                BidStatus::Accepted => stats.accepted += 1,
                BidStatus::Rejected => stats.rejected += 1,
                BidStatus::Withdrawn => stats.withdrawn += 1,
            }
        }
        for job in self.requests.list_awarded_to(servian_id, None).await? {
            stats.jobs_awarded += 1;
            if job.status == RequestStatus::Completed {
                stats.jobs_completed += 1;
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::profile::{CustomerProfile, Profile, SubscriptionTier, UserAccount};
    use crate::domain::{Budget, Urgency};
    use crate::test_support::{bid_input, new_request, TestMarket};

    #[tokio::test]
    async fn free_tier_quota_rolls_over_weekly() {
        let m = TestMarket::new();
        let customer = Uuid::new_v4();
        for _ in 0..3 {
            m.ctx.requests.create(customer, new_request()).await.unwrap();
        }
        let err = m.ctx.requests.create(customer, new_request()).await.unwrap_err();
        assert_eq!(err, MarketError::QuotaExceeded { remaining: 0 });

        m.clock.advance(Duration::days(7));
        m.ctx.requests.create(customer, new_request()).await.unwrap();
        let page = m.ctx.requests.list_for_customer(customer, None, Pagination::default()).await.unwrap();
        assert_eq!(page.pagination.total, 4);
    }

    #[tokio::test]
    async fn invalid_input_does_not_burn_quota() {
        let m = TestMarket::new();
        let customer = Uuid::new_v4();
        let mut bad = new_request();
        bad.budget = Budget { min: 10, max: 5 };
        for _ in 0..5 {
            assert!(matches!(m.ctx.requests.create(customer, bad.clone()).await, Err(MarketError::Validation(_))));
        }
        for _ in 0..3 {
            m.ctx.requests.create(customer, new_request()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn tier_comes_from_customer_profile() {
        let m = TestMarket::new();
        let customer = Uuid::new_v4();
        let now = m.clock.now();
        m.storage
            .profiles
            .upsert(&UserAccount {
                id: customer,
                name: "Ayesha".into(),
                email: "ayesha@example.com".into(),
                profile: Profile::Customer(CustomerProfile { tier: SubscriptionTier::Basic, ..CustomerProfile::default() }),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        for _ in 0..10 {
            m.ctx.requests.create(customer, new_request()).await.unwrap();
        }
        assert!(m.ctx.requests.create(customer, new_request()).await.is_err());
    }

    #[tokio::test]
    async fn other_customers_get_authorization_error() {
        let m = TestMarket::new();
        let owner = Uuid::new_v4();
        let req = m.ctx.requests.create(owner, new_request()).await.unwrap();
        let err = m.ctx.requests.get(Actor::customer(Uuid::new_v4()), req.id).await.unwrap_err();
        assert_eq!(err, MarketError::Authorization);
        assert!(m.ctx.requests.get(Actor::customer(owner), req.id).await.is_ok());
    }

    #[tokio::test]
    async fn servian_fetch_counts_views_without_bumping_version() {
        let m = TestMarket::new();
        let req = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();
        let servian = Actor::servian(Uuid::new_v4());
        m.ctx.requests.get(servian, req.id).await.unwrap();
        let view = m.ctx.requests.get(servian, req.id).await.unwrap();
        assert_eq!(view.request.views, 2);
        assert_eq!(view.request.version, 0);
        assert_eq!(view.time_left, Some(7));
    }

    #[tokio::test]
    async fn read_closes_expired_request_lazily() {
        let m = TestMarket::new();
        let owner = Uuid::new_v4();
        let req = m.ctx.requests.create(owner, new_request()).await.unwrap();
        m.clock.advance(Duration::days(8));
        let view = m.ctx.requests.get(Actor::customer(owner), req.id).await.unwrap();
        assert_eq!(view.request.status, RequestStatus::Closed);
        assert_eq!(view.time_left, None);
    }

    #[tokio::test]
    async fn update_only_before_bids() {
        let m = TestMarket::new();
        let owner = Uuid::new_v4();
        let req = m.ctx.requests.create(owner, new_request()).await.unwrap();
        let patch = RequestPatch { title: Some("Fix two sinks".into()), ..RequestPatch::default() };
        let view = m.ctx.requests.update(owner, req.id, patch.clone()).await.unwrap();
        assert_eq!(view.request.title, "Fix two sinks");
        assert_eq!(view.request.version, 1);

        m.ctx.bids.place(Uuid::new_v4(), req.id, bid_input(2000)).await.unwrap();
        assert!(matches!(m.ctx.requests.update(owner, req.id, patch).await, Err(MarketError::StateConflict(_))));
    }

    #[tokio::test]
    async fn open_listing_orders_by_urgency_then_recency() {
        let m = TestMarket::new();
        let mut low = new_request();
        low.urgency = Some(Urgency::Low);
        let mut emergency = new_request();
        emergency.urgency = Some(Urgency::Emergency);

        let a = m.ctx.requests.create(Uuid::new_v4(), low).await.unwrap();
        m.clock.advance(Duration::minutes(1));
        let b = m.ctx.requests.create(Uuid::new_v4(), emergency).await.unwrap();
        m.clock.advance(Duration::minutes(1));
        let c = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();

        let page = m
            .ctx
            .requests
            .list_open(Uuid::new_v4(), OpenRequestFilter::default(), Pagination::default())
            .await
            .unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|v| v.request.id).collect();
        assert_eq!(ids, vec![b.id, c.id, a.id]);

        let filter = OpenRequestFilter { min_budget: Some(10_000), ..OpenRequestFilter::default() };
        let page = m.ctx.requests.list_open(Uuid::new_v4(), filter, Pagination::default()).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn open_listing_total_leaves_out_expired_requests() {
        let m = TestMarket::new();
        let stale = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();
        let bid_on = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();
        m.ctx.bids.place(Uuid::new_v4(), bid_on.id, bid_input(2500)).await.unwrap();
        m.clock.advance(Duration::days(8));
        let fresh = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();

        let page = m
            .ctx
            .requests
            .list_open(Uuid::new_v4(), OpenRequestFilter::default(), Pagination { page: 1, per_page: 1 })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].request.id, fresh.id);
        let stale = m.storage.requests.get(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, RequestStatus::Closed);
    }

    #[tokio::test]
    async fn stats_for_both_sides() {
        let m = TestMarket::new();
        let customer = Uuid::new_v4();
        let servian = Uuid::new_v4();
        let r1 = m.ctx.requests.create(customer, new_request()).await.unwrap();
        let r2 = m.ctx.requests.create(customer, new_request()).await.unwrap();
        let bid = m.ctx.bids.place(servian, r1.id, bid_input(3000)).await.unwrap();
        m.ctx.bids.place(servian, r2.id, bid_input(3000)).await.unwrap();
        m.ctx.awards.accept(customer, r1.id, bid.id).await.unwrap();

        let c = m.ctx.requests.customer_stats(customer).await.unwrap();
        assert_eq!((c.total_requests, c.active, c.awarded, c.total_bids_received), (2, 1, 1, 2));

        let s = m.ctx.requests.servian_stats(servian).await.unwrap();
        assert_eq!((s.total_bids, s.pending, s.accepted, s.jobs_awarded), (2, 1, 1, 1));

        let pending = m.ctx.requests.servian_bids(servian, Some(BidStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request_id, r2.id);
        let jobs = m.ctx.requests.servian_jobs(servian, None).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }
}
