use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::commit::Committer;
use crate::domain::{Bid, BidInput, BidPatch};
use crate::errors::MarketError;
use crate::notify::{EventPublisher, Notification, NotificationKind};
use crate::repository::ProfileRepository;

/// Servian-side bid commands. Each one is a single guarded commit on the
/// owning request; the customer is notified once it is stored.
#[derive(Clone)]
pub struct BidLedger {
    committer: Committer,
    profiles: Arc<dyn ProfileRepository>,
    publisher: EventPublisher,
}

impl BidLedger {
    pub fn new(committer: Committer, profiles: Arc<dyn ProfileRepository>, publisher: EventPublisher) -> Self {
        Self { committer, profiles, publisher }
    }

    async fn display_name(&self, servian_id: Uuid) -> String {
        match self.profiles.get(servian_id).await {
            Ok(Some(account)) if !account.name.trim().is_empty() => account.name,
            _ => "A servian".to_string(),
        }
    }

    #[instrument(skip(self, input), fields(request_id = %request_id, servian_id = %servian_id, amount = input.amount))]
    pub async fn place(&self, servian_id: Uuid, request_id: Uuid, input: BidInput) -> Result<Bid, MarketError> {
        let (request, bid_id) = self
            .committer
            .apply(request_id, |r, now| r.place_bid(servian_id, input.clone(), now))
            .await?;
        let bid = request.bid(bid_id).cloned().ok_or(MarketError::BidNotFound)?;
        info!(event = "bid_placed", bid_id = %bid.id, total_bids = request.total_bids, "bid placed");

        let name = self.display_name(servian_id).await;
        self.publisher.publish(Notification::new(
            request.customer_id,
            NotificationKind::NewBid,
            format!("{} placed a bid of {} on your request \"{}\"", name, bid.amount, request.title),
            json!({ "requestId": request.id, "bidId": bid.id, "servianId": servian_id }),
        ));
        Ok(bid)
    }

    #[instrument(skip(self, patch), fields(request_id = %request_id, servian_id = %servian_id))]
    pub async fn update(&self, servian_id: Uuid, request_id: Uuid, patch: BidPatch) -> Result<Bid, MarketError> {
        let (request, bid_id) = self
            .committer
            .apply(request_id, |r, now| r.update_bid(servian_id, patch.clone(), now))
            .await?;
        let bid = request.bid(bid_id).cloned().ok_or(MarketError::BidNotFound)?;
        info!(event = "bid_updated", bid_id = %bid.id, amount = bid.amount, "bid updated");

        let name = self.display_name(servian_id).await;
        self.publisher.publish(Notification::new(
            request.customer_id,
            NotificationKind::BidUpdated,
            format!("{} updated their bid to {} on your request \"{}\"", name, bid.amount, request.title),
            json!({ "requestId": request.id, "bidId": bid.id, "servianId": servian_id }),
        ));
        Ok(bid)
    }

    #[instrument(skip(self), fields(request_id = %request_id, servian_id = %servian_id))]
    pub async fn withdraw(&self, servian_id: Uuid, request_id: Uuid) -> Result<(), MarketError> {
        let (request, bid_id) = self
            .committer
            .apply(request_id, |r, now| r.withdraw_bid(servian_id, now))
            .await?;
        info!(event = "bid_withdrawn", bid_id = %bid_id, total_bids = request.total_bids, "bid withdrawn");

        let name = self.display_name(servian_id).await;
        self.publisher.publish(Notification::new(
            request.customer_id,
            NotificationKind::BidWithdrawn,
            format!("{} has withdrawn their bid from your request \"{}\"", name, request.title),
            json!({ "requestId": request.id, "servianId": servian_id }),
        ));
        Ok(())
    }
}
