//! Award, cancellation, completion and expiry of service requests.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::commit::Committer;
use crate::domain::ServiceRequest;
use crate::errors::MarketError;
use crate::notify::{EventPublisher, Notification, NotificationKind};
use crate::repository::RequestRepository;

/// Close one expired request. `Ok(None)` when it is no longer eligible or gone.
pub(crate) async fn close_one(
    committer: &Committer,
    id: Uuid,
    auto_close_days: i64,
) -> Result<Option<ServiceRequest>, MarketError> {
    match committer.apply(id, |r, now| r.close_if_expired(now, auto_close_days)).await {
        Ok((closed, ())) => {
            info!(event = "request_closed", request_id = %id, "service request closed after bidding window lapsed");
            Ok(Some(closed))
        }
        Err(MarketError::StateConflict(_)) | Err(MarketError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct AwardCoordinator {
    requests: Arc<dyn RequestRepository>,
    committer: Committer,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
    auto_close_days: i64,
}

impl AwardCoordinator {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        committer: Committer,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
        auto_close_days: i64,
    ) -> Self {
        Self { requests, committer, publisher, clock, auto_close_days }
    }

    /// Accept one bid, reject the others and award the request, as a single
    /// conditional write. Of two racing calls exactly one succeeds; the other
    /// re-reads an AWARDED request and fails with `StateConflict`.
    #[instrument(skip(self), fields(request_id = %request_id, customer_id = %customer_id, bid_id = %bid_id))]
    pub async fn accept(&self, customer_id: Uuid, request_id: Uuid, bid_id: Uuid) -> Result<ServiceRequest, MarketError> {
        let (request, outcome) = self
            .committer
            .apply(request_id, |r, now| r.accept_bid(customer_id, bid_id, now))
            .await?;
        info!(
            event = "bid_accepted",
            servian_id = %outcome.winner,
            rejected = outcome.losers.len(),
            "bid accepted and request awarded"
        );

        self.publisher.publish(Notification::new(
            outcome.winner,
            NotificationKind::BidAccepted,
            format!("Your bid for \"{}\" has been accepted", request.title),
            json!({ "requestId": request.id, "bidId": outcome.bid_id }),
        ));
        for loser in &outcome.losers {
            let bid_id = request.bid_by_servian(*loser).map(|b| b.id);
            self.publisher.publish(Notification::new(
                *loser,
                NotificationKind::BidRejected,
                format!("Your bid for \"{}\" was not selected", request.title),
                json!({ "requestId": request.id, "bidId": bid_id }),
            ));
        }
        Ok(request)
    }

    #[instrument(skip(self, reason), fields(request_id = %request_id, customer_id = %customer_id))]
    pub async fn cancel(&self, customer_id: Uuid, request_id: Uuid, reason: Option<String>) -> Result<ServiceRequest, MarketError> {
        let (request, recipients) = self
            .committer
            .apply(request_id, |r, now| r.cancel(customer_id, reason.as_deref(), now))
            .await?;
        info!(event = "request_cancelled", notified = recipients.len(), "service request cancelled");

        for servian in recipients {
            self.publisher.publish(Notification::new(
                servian,
                NotificationKind::RequestCancelled,
                format!("The service request \"{}\" has been cancelled by the customer", request.title),
                json!({ "requestId": request.id }),
            ));
        }
        Ok(request)
    }

    #[instrument(skip(self), fields(request_id = %request_id, customer_id = %customer_id))]
    pub async fn complete(&self, customer_id: Uuid, request_id: Uuid) -> Result<ServiceRequest, MarketError> {
        let (request, servian) = self
            .committer
            .apply(request_id, |r, now| r.mark_completed(customer_id, now))
            .await?;
        info!(event = "request_completed", servian_id = %servian, "service request completed");

        self.publisher.publish(Notification::new(
            servian,
            NotificationKind::ServiceCompleted,
            format!("The service \"{}\" has been marked as completed", request.title),
            json!({ "requestId": request.id }),
        ));
        Ok(request)
    }

    /// Close every ACTIVE request that went `auto_close_days` without a bid.
    /// Eligibility is re-checked at commit time, so a bid that lands mid-sweep
    /// keeps its request open. Returns how many requests were closed.
    pub async fn close_expired(&self) -> Result<u32, MarketError> {
        let cutoff = self.clock.now() - Duration::days(self.auto_close_days);
        let candidates = self.requests.find_close_candidates(cutoff).await?;
        let mut closed = 0;
        for id in candidates {
            if close_one(&self.committer, id, self.auto_close_days).await?.is_some() {
                closed += 1;
            } else {
                debug!(request_id = %id, "skipped close candidate");
            }
        }
        Ok(closed)
    }
}
