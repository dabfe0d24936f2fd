//! Outbound domain notifications.
//!
//! Services push events into an unbounded channel through [`EventPublisher`]
//! after their commit succeeded; a [`NotificationDispatcher`] task drains the
//! channel into a [`NotificationSink`]. Delivery failures are logged and
//! dropped, so they can never undo or delay a committed transition.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::MarketError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewBid,
    BidUpdated,
    BidWithdrawn,
    BidAccepted,
    BidRejected,
    RequestCancelled,
    ServiceCompleted,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::NewBid => "new_bid",
            NotificationKind::BidUpdated => "bid_updated",
            NotificationKind::BidWithdrawn => "bid_withdrawn",
            NotificationKind::BidAccepted => "bid_accepted",
            NotificationKind::BidRejected => "bid_rejected",
            NotificationKind::RequestCancelled => "request_cancelled",
            NotificationKind::ServiceCompleted => "service_completed",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            NotificationKind::NewBid => "New Bid Received",
            NotificationKind::BidUpdated => "Bid Updated",
            NotificationKind::BidWithdrawn => "Bid Withdrawn",
            NotificationKind::BidAccepted => "Bid Accepted!",
            NotificationKind::BidRejected => "Bid Not Selected",
            NotificationKind::RequestCancelled => "Service Request Cancelled",
            NotificationKind::ServiceCompleted => "Service Marked Complete",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(recipient_id: Uuid, kind: NotificationKind, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self { recipient_id, kind, title: kind.title().to_string(), message: message.into(), data }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), MarketError>;
}

/// Writes notifications to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn deliver(&self, n: &Notification) -> Result<(), MarketError> {
        info!(
            target: "notifications",
            recipient_id = %n.recipient_id,
            kind = n.kind.as_str(),
            title = %n.title,
            "{}", n.message
        );
        Ok(())
    }
}

/// Cheap-to-clone handle services use to enqueue notifications.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<Notification>,
}

impl EventPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Never blocks and never fails the caller.
    pub fn publish(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            warn!(kind = err.0.kind.as_str(), recipient_id = %err.0.recipient_id, "notification channel closed, dropping event");
        }
    }
}

pub struct NotificationDispatcher {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl NotificationDispatcher {
    pub fn spawn(mut rx: mpsc::UnboundedReceiver<Notification>, sink: Arc<dyn NotificationSink>) -> Self {
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(n) => deliver(sink.as_ref(), &n).await,
                        None => break,
                    },
                    _ = &mut stop_rx => {
                        // flush whatever was queued before shutdown
                        while let Ok(n) = rx.try_recv() {
                            deliver(sink.as_ref(), &n).await;
                        }
                        break;
                    }
                }
            }
        });
        Self { stop, handle }
    }

    /// Deliver anything still queued, then stop the task.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "notification dispatcher ended abnormally");
        }
    }
}

async fn deliver(sink: &dyn NotificationSink, n: &Notification) {
    if let Err(e) = sink.deliver(n).await {
        warn!(recipient_id = %n.recipient_id, kind = n.kind.as_str(), error = %e, "notification delivery failed");
    }
}
