use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::pagination::{Page, Pagination};
use migration::MigratorTrait;
use sea_orm::DatabaseConnection;
use tokio::sync::{mpsc, OnceCell};
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::context::{AppContext, MarketSettings, Storage};
use crate::domain::{BidInput, BidStatus, Budget, Location, NewRequest, RequestStatus, ServiceCategory, ServiceRequest};
use crate::errors::MarketError;
use crate::notify::{EventPublisher, Notification, NotificationSink};
use crate::repo::InMemoryRequestRepository;
use crate::repository::{OpenRequestFilter, RequestRepository};

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// A connection to the test database, or `None` when DB tests are disabled
/// (`SKIP_DB_TESTS` set or no `DATABASE_URL`). Migrations run once per process.
pub async fn get_db() -> anyhow::Result<Option<DatabaseConnection>> {
    if std::env::var("SKIP_DB_TESTS").is_ok() || std::env::var("DATABASE_URL").is_err() {
        return Ok(None);
    }
    let mut cfg = configs::DatabaseConfig::default();
    cfg.normalize_from_env();
    cfg.min_connections = 1;
    cfg.acquire_timeout_secs = 10;

    MIGRATED
        .get_or_try_init(|| async {
            let db = models::db::connect_with_config(&cfg).await?;
            migration::Migrator::up(&db, None).await?;
            Ok::<(), anyhow::Error>(())
        })
        .await?;
    Ok(Some(models::db::connect_with_config(&cfg).await?))
}

/// Wednesday, so a few days of drift stay inside one quota week.
pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).single().unwrap_or_else(Utc::now)
}

pub struct TestMarket {
    pub ctx: AppContext,
    pub clock: Arc<ManualClock>,
    pub storage: Storage,
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl TestMarket {
    pub fn new() -> Self { Self::with_settings(MarketSettings::default()) }

    pub fn with_settings(settings: MarketSettings) -> Self { Self::with_storage(Storage::in_memory(), settings) }

    pub fn with_storage(storage: Storage, settings: MarketSettings) -> Self {
        let clock = Arc::new(ManualClock::new(test_start()));
        let (publisher, rx) = EventPublisher::channel();
        let ctx = AppContext::new(storage.clone(), clock.clone(), publisher, settings);
        Self { ctx, clock, storage, rx }
    }

    /// Everything published since the last drain.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            out.push(n);
        }
        out
    }
}

pub fn new_request() -> NewRequest {
    NewRequest {
        title: "Fix leaking sink".into(),
        description: "Kitchen sink drips all night".into(),
        service_category: ServiceCategory::Plumbing,
        location: Location { address: "12 Canal Road".into(), city: Some("Lahore".into()), ..Location::default() },
        urgency: None,
        preferred_date: None,
        budget: Budget { min: 1000, max: 5000 },
        images: vec![],
    }
}

pub fn bid_input(amount: i64) -> BidInput {
    BidInput { amount, message: Some("Can come tomorrow".into()), estimated_duration: None, materials: vec![], proposed_date: None }
}

pub fn sample_request(customer_id: Uuid, at: DateTime<Utc>) -> ServiceRequest {
    match ServiceRequest::open(customer_id, new_request(), at) {
        Ok(r) => r,
        Err(e) => panic!("sample request rejected: {e}"),
    }
}

#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<Notification> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, n: &Notification) -> Result<(), MarketError> {
        if let Ok(mut v) = self.seen.lock() {
            v.push(n.clone());
        }
        Ok(())
    }
}

/// In-memory request repository with switches for failures and interleavings
/// that are otherwise hard to line up.
#[derive(Default)]
pub struct ScriptedRequests {
    inner: InMemoryRequestRepository,
    fail_next_cas: AtomicBool,
    bid_after_scan: Mutex<Option<Uuid>>,
}

impl ScriptedRequests {
    /// The next compare-and-swap fails with a repository error.
    pub fn fail_next_cas(&self) { self.fail_next_cas.store(true, Ordering::SeqCst); }

    /// Right after the next close-candidate scan, `servian_id` bids on every
    /// candidate it returned.
    pub fn bid_after_next_scan(&self, servian_id: Uuid) {
        if let Ok(mut slot) = self.bid_after_scan.lock() {
            *slot = Some(servian_id);
        }
    }

    async fn place_bids(&self, servian_id: Uuid, ids: &[Uuid]) -> Result<(), MarketError> {
        for id in ids {
            let Some(mut next) = self.inner.get(*id).await? else { continue };
            let expected = next.version;
            let at = next.updated_at;
            next.place_bid(servian_id, bid_input(next.budget.min), at)?;
            self.inner.compare_and_swap(expected, &next).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RequestRepository for ScriptedRequests {
    async fn insert(&self, r: &ServiceRequest) -> Result<(), MarketError> { self.inner.insert(r).await }
    async fn get(&self, id: Uuid) -> Result<Option<ServiceRequest>, MarketError> { self.inner.get(id).await }
    async fn compare_and_swap(&self, expected: i64, next: &ServiceRequest) -> Result<bool, MarketError> {
        if self.fail_next_cas.swap(false, Ordering::SeqCst) {
            return Err(MarketError::Repository("connection reset".into()));
        }
        self.inner.compare_and_swap(expected, next).await
    }
    async fn increment_views(&self, id: Uuid) -> Result<(), MarketError> { self.inner.increment_views(id).await }
    async fn list_by_customer(&self, c: Uuid, s: Option<RequestStatus>, p: Pagination) -> Result<Page<ServiceRequest>, MarketError> {
        self.inner.list_by_customer(c, s, p).await
    }
    async fn status_summary(&self, c: Uuid) -> Result<Vec<(RequestStatus, u32)>, MarketError> { self.inner.status_summary(c).await }
    async fn list_open(&self, f: &OpenRequestFilter, p: Pagination) -> Result<Page<ServiceRequest>, MarketError> {
        self.inner.list_open(f, p).await
    }
    async fn list_by_servian_bids(&self, s: Uuid, b: Option<BidStatus>) -> Result<Vec<ServiceRequest>, MarketError> {
        self.inner.list_by_servian_bids(s, b).await
    }
    async fn list_awarded_to(&self, s: Uuid, st: Option<RequestStatus>) -> Result<Vec<ServiceRequest>, MarketError> {
        self.inner.list_awarded_to(s, st).await
    }
    async fn find_close_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, MarketError> {
        let ids = self.inner.find_close_candidates(cutoff).await?;
        let bidder = self.bid_after_scan.lock().ok().and_then(|mut slot| slot.take());
        if let Some(servian_id) = bidder {
            self.place_bids(servian_id, &ids).await?;
        }
        Ok(ids)
    }
}
