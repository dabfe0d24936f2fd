//! In-memory adapters backed by `DashMap`. Each per-key operation runs under
//! the owning shard's lock, which is what makes CAS and quota reservation atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::pagination::{Page, Pagination};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::profile::ServianProfile;
use crate::domain::{BidStatus, Profile, RatingSummary, RequestStatus, Review, ServiceRequest, UserAccount};
use crate::errors::MarketError;
use crate::repository::{OpenRequestFilter, ProfileRepository, QuotaStore, RequestRepository, ReviewRepository};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: DashMap<Uuid, ServiceRequest>,
}

impl InMemoryRequestRepository {
    fn collect(&self, keep: impl Fn(&ServiceRequest) -> bool) -> Vec<ServiceRequest> {
        self.requests.iter().filter(|r| keep(r.value())).map(|r| r.value().clone()).collect()
    }
}

fn newest_first(items: &mut [ServiceRequest]) {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), MarketError> {
        match self.requests.entry(request.id) {
            Entry::Occupied(_) => Err(MarketError::Repository(format!("duplicate request id {}", request.id))),
            Entry::Vacant(slot) => {
                slot.insert(request.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ServiceRequest>, MarketError> {
        Ok(self.requests.get(&id).map(|r| r.value().clone()))
    }

    async fn compare_and_swap(&self, expected: i64, next: &ServiceRequest) -> Result<bool, MarketError> {
        let Some(mut stored) = self.requests.get_mut(&next.id) else {
            return Ok(false);
        };
        if stored.version != expected {
            return Ok(false);
        }
        let views = stored.views;
        *stored = next.clone();
        stored.version = expected + 1;
        stored.views = views;
        Ok(true)
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), MarketError> {
        if let Some(mut stored) = self.requests.get_mut(&id) {
            stored.views += 1;
        }
        Ok(())
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<RequestStatus>,
        page: Pagination,
    ) -> Result<Page<ServiceRequest>, MarketError> {
        let mut items = self.collect(|r| r.customer_id == customer_id && status.map_or(true, |s| r.status == s));
        newest_first(&mut items);
        Ok(page.slice(items))
    }

    async fn status_summary(&self, customer_id: Uuid) -> Result<Vec<(RequestStatus, u32)>, MarketError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .map(|r| (r.status, r.total_bids))
            .collect())
    }

    async fn list_open(&self, filter: &OpenRequestFilter, page: Pagination) -> Result<Page<ServiceRequest>, MarketError> {
        let mut items = self.collect(|r| filter.matches(r));
        newest_first(&mut items);
        // stable sort keeps newest-first within one urgency level
        items.sort_by(|a, b| b.urgency.cmp(&a.urgency));
        Ok(page.slice(items))
    }

    async fn list_by_servian_bids(
        &self,
        servian_id: Uuid,
        bid_status: Option<BidStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError> {
        let mut items = self.collect(|r| {
            r.bid_by_servian(servian_id)
                .is_some_and(|b| bid_status.map_or(true, |s| b.status == s))
        });
        newest_first(&mut items);
        Ok(items)
    }

    async fn list_awarded_to(
        &self,
        servian_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError> {
        let mut items = self.collect(|r| {
            r.awarded_servian == Some(servian_id) && status.map_or(true, |s| r.status == s)
        });
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(items)
    }

    async fn find_close_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, MarketError> {
        Ok(self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Active && r.total_bids == 0 && r.created_at <= cutoff)
            .map(|r| r.id)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryQuotaStore {
    windows: DashMap<Uuid, (DateTime<Utc>, u32)>,
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn reserve(&self, customer_id: Uuid, window_start: DateTime<Utc>, cap: Option<u32>) -> Result<Option<u32>, MarketError> {
        let mut slot = self.windows.entry(customer_id).or_insert((window_start, 0));
        let (start, used) = slot.value_mut();
        if *start != window_start {
            *start = window_start;
            *used = 0;
        }
        if cap.is_some_and(|c| *used >= c) {
            return Ok(None);
        }
        *used += 1;
        Ok(Some(*used))
    }

    async fn release(&self, customer_id: Uuid, window_start: DateTime<Utc>) -> Result<(), MarketError> {
        if let Some(mut slot) = self.windows.get_mut(&customer_id) {
            let (start, used) = slot.value_mut();
            if *start == window_start {
                *used = used.saturating_sub(1);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReviewRepository {
    // keyed by request id: one review per request
    reviews: DashMap<Uuid, Review>,
}

#[async_trait]
impl ReviewRepository for InMemoryReviewRepository {
    async fn insert(&self, review: &Review) -> Result<(), MarketError> {
        match self.reviews.entry(review.request_id) {
            Entry::Occupied(_) => Err(MarketError::AlreadyReviewed),
            Entry::Vacant(slot) => {
                slot.insert(review.clone());
                Ok(())
            }
        }
    }

    async fn remove_for_request(&self, request_id: Uuid) -> Result<(), MarketError> {
        self.reviews.remove(&request_id);
        Ok(())
    }

    async fn ratings_for(&self, servian_id: Uuid) -> Result<Vec<u8>, MarketError> {
        Ok(self
            .reviews
            .iter()
            .filter(|r| r.reviewee_id == servian_id)
            .map(|r| r.rating)
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryProfileRepository {
    accounts: DashMap<Uuid, UserAccount>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn get(&self, id: Uuid) -> Result<Option<UserAccount>, MarketError> {
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }

    async fn upsert(&self, account: &UserAccount) -> Result<(), MarketError> {
        let mut next = account.clone();
        match self.accounts.entry(account.id) {
            Entry::Occupied(mut slot) => {
                if let (Profile::Servian(stored), Profile::Servian(incoming)) = (&slot.get().profile, &mut next.profile) {
                    incoming.average_rating = stored.average_rating;
                    incoming.total_reviews = stored.total_reviews;
                }
                slot.insert(next);
            }
            Entry::Vacant(slot) => {
                slot.insert(next);
            }
        }
        Ok(())
    }

    async fn store_rating(&self, servian_id: Uuid, summary: RatingSummary, now: DateTime<Utc>) -> Result<(), MarketError> {
        let mut account = self.accounts.entry(servian_id).or_insert_with(|| UserAccount {
            id: servian_id,
            name: String::new(),
            email: String::new(),
            profile: Profile::Servian(ServianProfile::default()),
            created_at: now,
            updated_at: now,
        });
        match &mut account.profile {
            Profile::Servian(p) if summary.total_reviews < p.total_reviews => return Ok(()),
            Profile::Servian(p) => {
                p.average_rating = summary.average_rating;
                p.total_reviews = summary.total_reviews;
            }
            Profile::Customer(_) => {
                return Err(MarketError::validation("reviewed account is not a servian"));
            }
        }
        account.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Budget, Location, NewRequest, ServiceCategory};
    use chrono::{Duration, TimeZone};

    fn sample(customer: Uuid, at: DateTime<Utc>) -> ServiceRequest {
        ServiceRequest::open(
            customer,
            NewRequest {
                title: "Paint fence".into(),
                description: "Two coats".into(),
                service_category: ServiceCategory::Painting,
                location: Location { address: "4 Hill St".into(), ..Location::default() },
                urgency: None,
                preferred_date: None,
                budget: Budget { min: 100, max: 200 },
                images: vec![],
            },
            at,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn cas_rejects_stale_version_and_keeps_views() {
        let repo = InMemoryRequestRepository::default();
        let now = Utc::now();
        let req = sample(Uuid::new_v4(), now);
        repo.insert(&req).await.unwrap();
        repo.increment_views(req.id).await.unwrap();

        let mut next = req.clone();
        next.title = "Paint the fence".into();
        assert!(repo.compare_and_swap(0, &next).await.unwrap());
        assert!(!repo.compare_and_swap(0, &next).await.unwrap());

        let stored = repo.get(req.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.views, 1);
        assert_eq!(stored.title, "Paint the fence");
    }

    #[tokio::test]
    async fn quota_resets_on_new_window() {
        let store = InMemoryQuotaStore::default();
        let customer = Uuid::new_v4();
        let w1 = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let w2 = w1 + Duration::days(7);
        assert_eq!(store.reserve(customer, w1, Some(2)).await.unwrap(), Some(1));
        assert_eq!(store.reserve(customer, w1, Some(2)).await.unwrap(), Some(2));
        assert_eq!(store.reserve(customer, w1, Some(2)).await.unwrap(), None);
        assert_eq!(store.reserve(customer, w2, Some(2)).await.unwrap(), Some(1));
        store.release(customer, w1).await.unwrap();
        assert_eq!(store.reserve(customer, w2, Some(2)).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn close_candidates_need_age_and_no_bids() {
        let repo = InMemoryRequestRepository::default();
        let old = Utc::now() - Duration::days(10);
        let stale = sample(Uuid::new_v4(), old);
        let fresh = sample(Uuid::new_v4(), Utc::now());
        repo.insert(&stale).await.unwrap();
        repo.insert(&fresh).await.unwrap();
        let ids = repo.find_close_candidates(Utc::now() - Duration::days(7)).await.unwrap();
        assert_eq!(ids, vec![stale.id]);
    }

    #[tokio::test]
    async fn duplicate_review_for_request_rejected() {
        let repo = InMemoryReviewRepository::default();
        let review = Review {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            reviewee_id: Uuid::new_v4(),
            rating: 5,
            comment: String::new(),
            role: crate::domain::ReviewRole::Customer,
            created_at: Utc::now(),
        };
        repo.insert(&review).await.unwrap();
        assert_eq!(repo.insert(&review).await, Err(MarketError::AlreadyReviewed));
        assert_eq!(repo.ratings_for(review.reviewee_id).await.unwrap(), vec![5]);
        repo.remove_for_request(review.request_id).await.unwrap();
        assert!(repo.ratings_for(review.reviewee_id).await.unwrap().is_empty());
        repo.insert(&review).await.unwrap();
    }

    #[tokio::test]
    async fn stale_rating_summary_is_ignored() {
        let repo = InMemoryProfileRepository::default();
        let servian = Uuid::new_v4();
        let now = Utc::now();
        let newer = RatingSummary { average_rating: 4.5, total_reviews: 2 };
        let stale = RatingSummary { average_rating: 5.0, total_reviews: 1 };
        repo.store_rating(servian, newer, now).await.unwrap();
        repo.store_rating(servian, stale, now).await.unwrap();
        let Profile::Servian(p) = repo.get(servian).await.unwrap().unwrap().profile else { panic!("expected servian") };
        assert_eq!((p.average_rating, p.total_reviews), (4.5, 2));
    }

    #[tokio::test]
    async fn upsert_keeps_stored_rating() {
        let repo = InMemoryProfileRepository::default();
        let servian = Uuid::new_v4();
        let now = Utc::now();
        repo.store_rating(servian, RatingSummary { average_rating: 3.5, total_reviews: 4 }, now).await.unwrap();
        let account = UserAccount {
            id: servian,
            name: "Bilal".into(),
            email: "bilal@example.com".into(),
            profile: Profile::Servian(ServianProfile { skills: vec!["roofing".into()], ..ServianProfile::default() }),
            created_at: now,
            updated_at: now,
        };
        repo.upsert(&account).await.unwrap();
        let stored = repo.get(servian).await.unwrap().unwrap();
        assert_eq!(stored.name, "Bilal");
        let Profile::Servian(p) = stored.profile else { panic!("expected servian") };
        assert_eq!((p.average_rating, p.total_reviews), (3.5, 4));
        assert_eq!(p.skills, vec!["roofing".to_string()]);
    }
}
