//! Optimistic commit loop shared by every request mutation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::ServiceRequest;
use crate::errors::MarketError;
use crate::repository::RequestRepository;

#[derive(Clone)]
pub struct Committer {
    repo: Arc<dyn RequestRepository>,
    clock: Arc<dyn Clock>,
    attempts: u32,
}

impl Committer {
    pub fn new(repo: Arc<dyn RequestRepository>, clock: Arc<dyn Clock>, attempts: u32) -> Self {
        Self { repo, clock, attempts: attempts.max(1) }
    }

    pub async fn load(&self, id: Uuid) -> Result<ServiceRequest, MarketError> {
        self.repo.get(id).await?.ok_or_else(|| MarketError::not_found("service request"))
    }

    /// Load the request, run `command` against a private copy and commit it
    /// with a compare-and-swap on the version it was loaded at.
    ///
    /// A lost race re-runs the whole command, preconditions included, against
    /// the fresh state. Command errors and storage errors return immediately.
    pub async fn apply<T, F>(&self, id: Uuid, mut command: F) -> Result<(ServiceRequest, T), MarketError>
    where
        F: FnMut(&mut ServiceRequest, DateTime<Utc>) -> Result<T, MarketError> + Send,
        T: Send,
    {
        for attempt in 1..=self.attempts {
            let mut next = self.load(id).await?;
            let expected = next.version;
            let out = command(&mut next, self.clock.now())?;
            debug_assert!(next.invariants_hold(), "command broke aggregate invariants");

            if self.repo.compare_and_swap(expected, &next).await? {
                next.version = expected + 1;
                return Ok((next, out));
            }
            debug!(request_id = %id, attempt, "version conflict, re-evaluating");
        }
        Err(MarketError::conflict("request was modified concurrently, please retry"))
    }
}
