//! Weekly request-creation quota per customer.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::SubscriptionTier;
use crate::errors::MarketError;
use crate::repository::QuotaStore;

/// Weekly caps per tier; PREMIUM is unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub free: u32,
    pub basic: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self { Self { free: 3, basic: 10 } }
}

impl QuotaPolicy {
    pub fn cap(&self, tier: SubscriptionTier) -> Option<u32> {
        match tier {
            SubscriptionTier::Free => Some(self.free),
            SubscriptionTier::Basic => Some(self.basic),
            SubscriptionTier::Premium => None,
        }
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// A slot taken from the customer's weekly allowance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaReservation {
    pub customer_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub used: u32,
    /// `None` for unlimited tiers.
    pub remaining: Option<u32>,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    policy: QuotaPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>, policy: QuotaPolicy) -> Self {
        Self { store, clock, policy }
    }

    /// Atomically count one creation against the current week.
    #[instrument(skip(self), fields(customer_id = %customer_id, tier = ?tier))]
    pub async fn check_and_reserve(&self, customer_id: Uuid, tier: SubscriptionTier) -> Result<QuotaReservation, MarketError> {
        let cap = self.policy.cap(tier);
        let window_start = week_start(self.clock.now());
        match self.store.reserve(customer_id, window_start, cap).await? {
            Some(used) => {
                debug!(used, "quota slot reserved");
                Ok(QuotaReservation {
                    customer_id,
                    window_start,
                    used,
                    remaining: cap.map(|c| c.saturating_sub(used)),
                })
            }
            None => Err(MarketError::QuotaExceeded { remaining: 0 }),
        }
    }

    /// Return a slot when the creation it guarded did not go through.
    pub async fn release(&self, reservation: &QuotaReservation) -> Result<(), MarketError> {
        self.store.release(reservation.customer_id, reservation.window_start).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repo::InMemoryQuotaStore;
    use chrono::{TimeZone, Weekday};

    fn limiter(clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(Arc::new(InMemoryQuotaStore::default()), clock, QuotaPolicy::default())
    }

    #[test]
    fn week_starts_monday_midnight() {
        // Sunday evening belongs to the week that began six days earlier
        let sunday = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 0).unwrap();
        let start = week_start(sunday);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(start.weekday(), Weekday::Mon);
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[tokio::test]
    async fn free_tier_stops_at_three_and_resets_next_week() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap()));
        let limiter = limiter(clock.clone());
        let customer = Uuid::new_v4();
        for expected in 1..=3 {
            let r = limiter.check_and_reserve(customer, SubscriptionTier::Free).await.unwrap();
            assert_eq!(r.used, expected);
        }
        assert_eq!(
            limiter.check_and_reserve(customer, SubscriptionTier::Free).await,
            Err(MarketError::QuotaExceeded { remaining: 0 })
        );

        clock.set(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 1).unwrap());
        let r = limiter.check_and_reserve(customer, SubscriptionTier::Free).await.unwrap();
        assert_eq!(r.used, 1);
        assert_eq!(r.remaining, Some(2));
    }

    #[tokio::test]
    async fn premium_is_unlimited() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(clock);
        let customer = Uuid::new_v4();
        for _ in 0..25 {
            let r = limiter.check_and_reserve(customer, SubscriptionTier::Premium).await.unwrap();
            assert_eq!(r.remaining, None);
        }
    }

    #[tokio::test]
    async fn concurrent_reservations_respect_last_slot() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(clock);
        let customer = Uuid::new_v4();
        limiter.check_and_reserve(customer, SubscriptionTier::Free).await.unwrap();
        limiter.check_and_reserve(customer, SubscriptionTier::Free).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let l = limiter.clone();
                tokio::spawn(async move { l.check_and_reserve(customer, SubscriptionTier::Free).await })
            })
            .collect();
        let mut ok = 0;
        for t in tasks {
            if t.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn release_gives_slot_back() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = limiter(clock);
        let customer = Uuid::new_v4();
        let mut last = None;
        for _ in 0..3 {
            last = Some(limiter.check_and_reserve(customer, SubscriptionTier::Free).await.unwrap());
        }
        if let Some(r) = last {
            limiter.release(&r).await.unwrap();
        }
        assert!(limiter.check_and_reserve(customer, SubscriptionTier::Free).await.is_ok());
    }
}
