//! User accounts: one identity composed with a role-specific profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::ServiceCategory;
use crate::errors::MarketError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Servian,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Servian => "servian",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = MarketError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "servian" => Ok(Role::Servian),
            other => Err(MarketError::validation(format!("unknown role `{other}`"))),
        }
    }
}

/// Caller identity as supplied by the transport layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn customer(id: Uuid) -> Self { Self { id, role: Role::Customer } }
    pub fn servian(id: Uuid) -> Self { Self { id, role: Role::Servian } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Basic,
    Premium,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    #[serde(default)]
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub preferred_services: Vec<ServiceCategory>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServianProfile {
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub service_category: Option<ServiceCategory>,
    #[serde(default)]
    pub available_for_home_visit: bool,
    /// Maintained by the review aggregator, never by profile edits.
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_reviews: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Customer(CustomerProfile),
    Servian(ServianProfile),
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::Customer(_) => Role::Customer,
            Profile::Servian(_) => Role::Servian,
        }
    }

    pub fn empty_for(role: Role) -> Self {
        match role {
            Role::Customer => Profile::Customer(CustomerProfile::default()),
            Role::Servian => Profile::Servian(ServianProfile::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn role(&self) -> Role { self.profile.role() }

    /// Quota tier of a customer account; servians have none.
    pub fn tier(&self) -> Option<SubscriptionTier> {
        match &self.profile {
            Profile::Customer(c) => Some(c.tier),
            Profile::Servian(_) => None,
        }
    }
}

/// Aggregate rating of a servian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub total_reviews: u32,
}

impl RatingSummary {
    /// Exact arithmetic mean over every rating. Rounding is left to presentation.
    pub fn from_ratings(ratings: &[u8]) -> Self {
        if ratings.is_empty() {
            return Self::default();
        }
        let sum: u64 = ratings.iter().map(|&r| u64::from(r)).sum();
        let mean = sum as f64 / ratings.len() as f64;
        Self { average_rating: mean, total_reviews: ratings.len() as u32 }
    }
}
