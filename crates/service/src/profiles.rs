use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::{Actor, Profile, UserAccount};
use crate::errors::MarketError;
use crate::repository::ProfileRepository;

#[derive(Clone, Debug, Deserialize)]
pub struct ProfileInput {
    pub name: String,
    pub email: String,
    pub profile: Profile,
}

#[derive(Clone)]
pub struct ProfileService {
    profiles: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
}

impl ProfileService {
    pub fn new(profiles: Arc<dyn ProfileRepository>, clock: Arc<dyn Clock>) -> Self { Self { profiles, clock } }

    pub async fn get(&self, id: Uuid) -> Result<UserAccount, MarketError> {
        self.profiles.get(id).await?.ok_or_else(|| MarketError::not_found("profile"))
    }

    /// Create or replace the caller's own profile. The profile variant must
    /// match the caller's role, and rating fields stay under review control.
    #[instrument(skip(self, input), fields(user_id = %actor.id, role = actor.role.as_str()))]
    pub async fn upsert_own(&self, actor: Actor, input: ProfileInput) -> Result<UserAccount, MarketError> {
        if input.profile.role() != actor.role {
            return Err(MarketError::validation("profile type does not match account role"));
        }
        if input.name.trim().is_empty() {
            return Err(MarketError::validation("name is required"));
        }
        if !input.email.contains('@') {
            return Err(MarketError::validation("a valid email is required"));
        }

        let now = self.clock.now();
        let existing = self.profiles.get(actor.id).await?;
        let kept_rating = existing.as_ref().and_then(|a| match &a.profile {
            Profile::Servian(p) => Some((p.average_rating, p.total_reviews)),
            Profile::Customer(_) => None,
        });
        let mut profile = input.profile;
        if let Profile::Servian(next) = &mut profile {
            (next.average_rating, next.total_reviews) = kept_rating.unwrap_or((0.0, 0));
        }

        let account = UserAccount {
            id: actor.id,
            name: input.name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            profile,
            created_at: existing.as_ref().map_or(now, |a| a.created_at),
            updated_at: now,
        };
        self.profiles.upsert(&account).await?;
        info!(event = "profile_saved", "profile saved");
        Ok(account)
    }
}
