//! Periodic auto-close of requests that got no bids in time.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::award::AwardCoordinator;

pub struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn spawn(awards: AwardCoordinator, every: Duration) -> Self {
        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => match awards.close_expired().await {
                        Ok(0) => {}
                        Ok(closed) => info!(event = "requests_auto_closed", closed, "expiry sweep closed requests"),
                        Err(e) => error!(error = %e, "expiry sweep failed"),
                    },
                    _ = &mut stop_rx => break,
                }
            }
        });
        info!(interval_secs = every.as_secs(), "expiry sweeper started");
        Self { stop, handle }
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "expiry sweeper ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestStatus;
    use crate::test_support::{new_request, TestMarket};
    use uuid::Uuid;

    #[tokio::test]
    async fn first_tick_closes_expired_requests() {
        let m = TestMarket::new();
        let req = m.ctx.requests.create(Uuid::new_v4(), new_request()).await.unwrap();
        m.clock.advance(chrono::Duration::days(8));

        let sweeper = Sweeper::spawn(m.ctx.awards.clone(), Duration::from_secs(3600));
        let mut closed = false;
        for _ in 0..50 {
            let stored = m.storage.requests.get(req.id).await.unwrap().unwrap();
            if stored.status == RequestStatus::Closed {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.shutdown().await;
        assert!(closed);
    }
}
