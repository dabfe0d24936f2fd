//! Wiring of storage adapters and services into one cloneable handle.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;

use crate::award::AwardCoordinator;
use crate::bid_ledger::BidLedger;
use crate::clock::Clock;
use crate::commit::Committer;
use crate::notify::{EventPublisher, Notification, NotificationDispatcher, NotificationSink};
use crate::profiles::ProfileService;
use crate::rate_limiter::{QuotaPolicy, RateLimiter};
use crate::repo::{
    InMemoryProfileRepository, InMemoryQuotaStore, InMemoryRequestRepository, InMemoryReviewRepository,
    SeaOrmProfileRepository, SeaOrmQuotaStore, SeaOrmRequestRepository, SeaOrmReviewRepository,
};
use crate::repository::{ProfileRepository, QuotaStore, RequestRepository, ReviewRepository};
use crate::request_store::RequestStore;
use crate::reviews::ReviewAggregator;
use crate::sweeper::Sweeper;

#[derive(Clone, Debug)]
pub struct MarketSettings {
    pub auto_close_days: i64,
    /// 0 disables the background sweeper.
    pub sweep_interval_secs: u64,
    pub commit_attempts: u32,
    pub quota: QuotaPolicy,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self { auto_close_days: 7, sweep_interval_secs: 3600, commit_attempts: 16, quota: QuotaPolicy::default() }
    }
}

impl From<&configs::MarketConfig> for MarketSettings {
    fn from(cfg: &configs::MarketConfig) -> Self {
        Self {
            auto_close_days: cfg.auto_close_days,
            sweep_interval_secs: cfg.sweep_interval_secs,
            commit_attempts: cfg.commit_attempts.max(1),
            quota: QuotaPolicy { free: cfg.free_weekly_quota, basic: cfg.basic_weekly_quota },
        }
    }
}

/// The four persistence seams, either all in memory or all on Postgres.
#[derive(Clone)]
pub struct Storage {
    pub requests: Arc<dyn RequestRepository>,
    pub quotas: Arc<dyn QuotaStore>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            requests: Arc::new(InMemoryRequestRepository::default()),
            quotas: Arc::new(InMemoryQuotaStore::default()),
            reviews: Arc::new(InMemoryReviewRepository::default()),
            profiles: Arc::new(InMemoryProfileRepository::default()),
        }
    }

    pub fn postgres(db: DatabaseConnection) -> Self {
        Self {
            requests: Arc::new(SeaOrmRequestRepository { db: db.clone() }),
            quotas: Arc::new(SeaOrmQuotaStore { db: db.clone() }),
            reviews: Arc::new(SeaOrmReviewRepository { db: db.clone() }),
            profiles: Arc::new(SeaOrmProfileRepository { db }),
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub requests: RequestStore,
    pub bids: BidLedger,
    pub awards: AwardCoordinator,
    pub reviews: ReviewAggregator,
    pub profiles: ProfileService,
    pub settings: MarketSettings,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, publisher: EventPublisher, settings: MarketSettings) -> Self {
        let committer = Committer::new(storage.requests.clone(), clock.clone(), settings.commit_attempts);
        let limiter = RateLimiter::new(storage.quotas.clone(), clock.clone(), settings.quota);
        Self {
            requests: RequestStore::new(
                storage.requests.clone(),
                storage.profiles.clone(),
                limiter,
                committer.clone(),
                clock.clone(),
                settings.clone(),
            ),
            bids: BidLedger::new(committer.clone(), storage.profiles.clone(), publisher.clone()),
            awards: AwardCoordinator::new(
                storage.requests.clone(),
                committer.clone(),
                publisher,
                clock.clone(),
                settings.auto_close_days,
            ),
            reviews: ReviewAggregator::new(committer, storage.reviews.clone(), storage.profiles.clone(), clock.clone()),
            profiles: ProfileService::new(storage.profiles, clock.clone()),
            settings,
            clock,
        }
    }

    pub fn in_memory(clock: Arc<dyn Clock>, publisher: EventPublisher, settings: MarketSettings) -> Self {
        Self::new(Storage::in_memory(), clock, publisher, settings)
    }

    pub fn postgres(db: DatabaseConnection, clock: Arc<dyn Clock>, publisher: EventPublisher, settings: MarketSettings) -> Self {
        Self::new(Storage::postgres(db), clock, publisher, settings)
    }

    /// Start the notification dispatcher and, unless disabled, the expiry sweeper.
    pub fn start_background(
        &self,
        rx: mpsc::UnboundedReceiver<Notification>,
        sink: Arc<dyn NotificationSink>,
    ) -> Background {
        let dispatcher = NotificationDispatcher::spawn(rx, sink);
        let sweeper = (self.settings.sweep_interval_secs > 0)
            .then(|| Sweeper::spawn(self.awards.clone(), Duration::from_secs(self.settings.sweep_interval_secs)));
        Background { dispatcher, sweeper }
    }
}

pub struct Background {
    dispatcher: NotificationDispatcher,
    sweeper: Option<Sweeper>,
}

impl Background {
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.shutdown().await;
        }
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::test_support::{new_request, RecordingSink};
    use uuid::Uuid;

    #[test]
    fn settings_from_config() {
        let cfg = configs::MarketConfig { commit_attempts: 0, free_weekly_quota: 5, ..configs::MarketConfig::default() };
        let s = MarketSettings::from(&cfg);
        assert_eq!(s.commit_attempts, 1);
        assert_eq!(s.quota.free, 5);
        assert_eq!(s.auto_close_days, 7);
    }

    #[tokio::test]
    async fn background_delivers_and_shuts_down() {
        let (publisher, rx) = EventPublisher::channel();
        let settings = MarketSettings { sweep_interval_secs: 0, ..MarketSettings::default() };
        let ctx = AppContext::in_memory(Arc::new(SystemClock), publisher, settings);
        let sink = Arc::new(RecordingSink::default());
        let bg = ctx.start_background(rx, sink.clone());

        let req = ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();
        ctx.bids.place(Uuid::new_v4(), req.id, crate::test_support::bid_input(1500)).await.unwrap();
        bg.shutdown().await;
        assert_eq!(sink.delivered().len(), 1);
    }
}
