//! The `ServiceRequest` aggregate and its bid ledger.
//!
//! Every mutation is a pure method on the aggregate: it checks its
//! preconditions against the current state and either applies the whole
//! change or returns an error leaving `self` untouched. Persisting the result
//! (and retrying on a version conflict) is the caller's job, see
//! [`crate::commit::Committer`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MarketError;

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 1000;
pub const BID_MESSAGE_MAX: usize = 500;
pub const REVIEW_COMMENT_MAX: usize = 500;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self { $($name::$variant => $text),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }

        impl FromStr for $name {
            type Err = MarketError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(MarketError::validation(format!(
                        "unknown {} `{}`", stringify!($name), other
                    ))),
                }
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCategory {
    HomeMaintenance,
    Electrical,
    Plumbing,
    Carpentry,
    Cleaning,
    Painting,
    AcRepair,
    ApplianceRepair,
    Gardening,
    Other,
}

string_enum!(ServiceCategory {
    HomeMaintenance => "HOME_MAINTENANCE",
    Electrical => "ELECTRICAL",
    Plumbing => "PLUMBING",
    Carpentry => "CARPENTRY",
    Cleaning => "CLEANING",
    Painting => "PAINTING",
    AcRepair => "AC_REPAIR",
    ApplianceRepair => "APPLIANCE_REPAIR",
    Gardening => "GARDENING",
    Other => "OTHER",
});

/// Ordered from least to most pressing; open listings sort on this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

string_enum!(Urgency { Low => "LOW", Medium => "MEDIUM", High => "HIGH", Emergency => "EMERGENCY" });

impl Urgency {
    pub fn rank(self) -> i16 {
        match self {
            Urgency::Low => 0,
            Urgency::Medium => 1,
            Urgency::High => 2,
            Urgency::Emergency => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Active,
    Awarded,
    Completed,
    Cancelled,
    Closed,
}

string_enum!(RequestStatus {
    Active => "ACTIVE",
    Awarded => "AWARDED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Closed => "CLOSED",
});

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Active,
        RequestStatus::Awarded,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
        RequestStatus::Closed,
    ];

    /// The only legal edges of the request lifecycle.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Active, Awarded) | (Active, Cancelled) | (Active, Closed) | (Awarded, Completed) | (Awarded, Cancelled)
        )
    }

    pub fn ensure_transition(self, next: RequestStatus) -> Result<(), MarketError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(MarketError::conflict(format!("cannot move request from {self} to {next}")))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Closed)
    }

    /// Statuses that carry an awarded servian.
    pub fn has_award(self) -> bool { matches!(self, RequestStatus::Awarded | RequestStatus::Completed) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStatus {
    Pending,
    Accepted,
    Rejected,
    Withdrawn,
}

string_enum!(BidStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
});

impl BidStatus {
    pub const ALL: [BidStatus; 4] = [BidStatus::Pending, BidStatus::Accepted, BidStatus::Rejected, BidStatus::Withdrawn];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub min: i64,
    pub max: i64,
}

impl Budget {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.min < 0 {
            return Err(MarketError::validation("budget min cannot be negative"));
        }
        if self.min >= self.max {
            return Err(MarketError::validation("budget min must be less than max"));
        }
        Ok(())
    }

    pub fn contains(&self, amount: i64) -> bool { (self.min..=self.max).contains(&amount) }

    fn ensure_contains(&self, amount: i64) -> Result<(), MarketError> {
        if self.contains(amount) {
            Ok(())
        } else {
            Err(MarketError::OutOfRange { min: self.min, max: self.max })
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub address: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// `[longitude, latitude]`
    #[serde(default)]
    pub coordinates: Option<[f64; 2]>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub item: String,
    #[serde(default)]
    pub cost: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: Uuid,
    pub servian_id: Uuid,
    pub amount: i64,
    pub message: String,
    pub estimated_duration: Option<String>,
    pub materials: Vec<Material>,
    pub proposed_date: Option<DateTime<Utc>>,
    pub status: BidStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReview {
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: String,
    pub service_category: ServiceCategory,
    pub location: Location,
    pub urgency: Urgency,
    pub preferred_date: Option<DateTime<Utc>>,
    pub budget: Budget,
    pub images: Vec<String>,
    pub status: RequestStatus,
    pub bids: Vec<Bid>,
    pub awarded_servian: Option<Uuid>,
    pub total_bids: u32,
    pub views: u64,
    pub review: Option<RequestReview>,
    /// Optimistic concurrency stamp, bumped by every committed mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub service_category: ServiceCategory,
    pub location: Location,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub preferred_date: Option<DateTime<Utc>>,
    pub budget: Budget,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<Budget>,
    pub urgency: Option<Urgency>,
    pub preferred_date: Option<DateTime<Utc>>,
    pub images: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidInput {
    pub amount: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub estimated_duration: Option<String>,
    #[serde(default)]
    pub materials: Vec<Material>,
    #[serde(default)]
    pub proposed_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPatch {
    pub amount: Option<i64>,
    pub message: Option<String>,
    pub estimated_duration: Option<String>,
    pub materials: Option<Vec<Material>>,
    pub proposed_date: Option<DateTime<Utc>>,
}

/// Who has to hear about an award.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwardOutcome {
    pub bid_id: Uuid,
    pub winner: Uuid,
    pub losers: Vec<Uuid>,
}

fn check_title(title: &str) -> Result<(), MarketError> {
    let len = title.trim().chars().count();
    if len == 0 {
        return Err(MarketError::validation("title is required"));
    }
    if len > TITLE_MAX {
        return Err(MarketError::validation(format!("title cannot exceed {TITLE_MAX} characters")));
    }
    Ok(())
}

fn check_description(description: &str) -> Result<(), MarketError> {
    let len = description.trim().chars().count();
    if len == 0 {
        return Err(MarketError::validation("description is required"));
    }
    if len > DESCRIPTION_MAX {
        return Err(MarketError::validation(format!("description cannot exceed {DESCRIPTION_MAX} characters")));
    }
    Ok(())
}

fn check_bid_shape(amount: Option<i64>, message: Option<&str>) -> Result<(), MarketError> {
    if matches!(amount, Some(a) if a < 0) {
        return Err(MarketError::validation("bid amount cannot be negative"));
    }
    if matches!(message, Some(m) if m.chars().count() > BID_MESSAGE_MAX) {
        return Err(MarketError::validation(format!("message cannot exceed {BID_MESSAGE_MAX} characters")));
    }
    Ok(())
}

fn check_not_past(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), MarketError> {
    match date {
        Some(d) if d < now => Err(MarketError::InvalidDate),
        _ => Ok(()),
    }
}

impl ServiceRequest {
    /// Build a fresh ACTIVE request owned by `customer_id`.
    pub fn open(customer_id: Uuid, input: NewRequest, now: DateTime<Utc>) -> Result<Self, MarketError> {
        check_title(&input.title)?;
        check_description(&input.description)?;
        if input.location.address.trim().is_empty() {
            return Err(MarketError::validation("location address is required"));
        }
        input.budget.validate()?;
        check_not_past(input.preferred_date, now)?;

        Ok(Self {
            id: Uuid::new_v4(),
            customer_id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            service_category: input.service_category,
            location: input.location,
            urgency: input.urgency.unwrap_or_default(),
            preferred_date: input.preferred_date,
            budget: input.budget,
            images: input.images,
            status: RequestStatus::Active,
            bids: Vec::new(),
            awarded_servian: None,
            total_bids: 0,
            views: 0,
            review: None,
            version: 0,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            completed_at: None,
        })
    }

    pub fn bid(&self, bid_id: Uuid) -> Option<&Bid> { self.bids.iter().find(|b| b.id == bid_id) }

    pub fn bid_by_servian(&self, servian_id: Uuid) -> Option<&Bid> {
        self.bids.iter().find(|b| b.servian_id == servian_id)
    }

    pub fn bidders(&self) -> Vec<Uuid> { self.bids.iter().map(|b| b.servian_id).collect() }

    fn ensure_owner(&self, customer_id: Uuid) -> Result<(), MarketError> {
        if self.customer_id == customer_id { Ok(()) } else { Err(MarketError::Authorization) }
    }

    fn transition(&mut self, next: RequestStatus, now: DateTime<Utc>) -> Result<(), MarketError> {
        self.status.ensure_transition(next)?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    fn sync_total(&mut self) { self.total_bids = self.bids.len() as u32; }

    /// Append a PENDING bid. Precondition failures are reported in a fixed
    /// order: duplicate, bid shape, amount range, request status, proposed date.
    pub fn place_bid(&mut self, servian_id: Uuid, input: BidInput, now: DateTime<Utc>) -> Result<Uuid, MarketError> {
        if self.bid_by_servian(servian_id).is_some() {
            return Err(MarketError::DuplicateBid);
        }
        check_bid_shape(Some(input.amount), input.message.as_deref())?;
        self.budget.ensure_contains(input.amount)?;
        if self.status != RequestStatus::Active {
            return Err(MarketError::RequestNotActive);
        }
        check_not_past(input.proposed_date, now)?;

        let id = Uuid::new_v4();
        self.bids.push(Bid {
            id,
            servian_id,
            amount: input.amount,
            message: input.message.unwrap_or_default(),
            estimated_duration: input.estimated_duration,
            materials: input.materials,
            proposed_date: input.proposed_date,
            status: BidStatus::Pending,
            submitted_at: now,
            updated_at: None,
        });
        self.sync_total();
        self.updated_at = now;
        Ok(id)
    }

    pub fn update_bid(&mut self, servian_id: Uuid, patch: BidPatch, now: DateTime<Utc>) -> Result<Uuid, MarketError> {
        let current = self.bid_by_servian(servian_id).ok_or(MarketError::BidNotFound)?;
        if current.status != BidStatus::Pending {
            return Err(MarketError::conflict("bid is no longer pending"));
        }
        if self.status != RequestStatus::Active {
            return Err(MarketError::RequestNotActive);
        }
        check_bid_shape(patch.amount, patch.message.as_deref())?;
        if let Some(amount) = patch.amount {
            self.budget.ensure_contains(amount)?;
        }
        check_not_past(patch.proposed_date, now)?;

        let bid = self
            .bids
            .iter_mut()
            .find(|b| b.servian_id == servian_id)
            .ok_or(MarketError::BidNotFound)?;
        if let Some(amount) = patch.amount { bid.amount = amount; }
        if let Some(message) = patch.message { bid.message = message; }
        if let Some(duration) = patch.estimated_duration { bid.estimated_duration = Some(duration); }
        if let Some(materials) = patch.materials { bid.materials = materials; }
        if let Some(date) = patch.proposed_date { bid.proposed_date = Some(date); }
        bid.updated_at = Some(now);
        let id = bid.id;
        self.updated_at = now;
        Ok(id)
    }

    /// Remove the servian's PENDING bid from the ledger entirely.
    pub fn withdraw_bid(&mut self, servian_id: Uuid, now: DateTime<Utc>) -> Result<Uuid, MarketError> {
        let pos = self
            .bids
            .iter()
            .position(|b| b.servian_id == servian_id && b.status == BidStatus::Pending)
            .ok_or(MarketError::BidNotFound)?;
        if self.status != RequestStatus::Active {
            return Err(MarketError::RequestNotActive);
        }
        let removed = self.bids.remove(pos);
        self.sync_total();
        self.updated_at = now;
        Ok(removed.id)
    }

    /// Accept one PENDING bid, reject every other bid and move to AWARDED.
    pub fn accept_bid(&mut self, customer_id: Uuid, bid_id: Uuid, now: DateTime<Utc>) -> Result<AwardOutcome, MarketError> {
        self.ensure_owner(customer_id)?;
        if self.status != RequestStatus::Active {
            return Err(MarketError::conflict(format!("request is {}, not ACTIVE", self.status)));
        }
        let target = self.bid(bid_id).ok_or(MarketError::BidNotFound)?;
        if target.status != BidStatus::Pending {
            return Err(MarketError::conflict("bid is no longer available"));
        }
        let winner = target.servian_id;
        self.transition(RequestStatus::Awarded, now)?;

        let mut losers = Vec::with_capacity(self.bids.len().saturating_sub(1));
        for bid in &mut self.bids {
            if bid.id == bid_id {
                bid.status = BidStatus::Accepted;
            } else {
                bid.status = BidStatus::Rejected;
                losers.push(bid.servian_id);
            }
        }
        self.awarded_servian = Some(winner);
        Ok(AwardOutcome { bid_id, winner, losers })
    }

    /// Cancel from ACTIVE or AWARDED and return every servian who bid.
    ///
    /// An awarded engagement is released: the accepted bid becomes WITHDRAWN
    /// and the awarded servian is cleared.
    pub fn cancel(&mut self, customer_id: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> Result<Vec<Uuid>, MarketError> {
        self.ensure_owner(customer_id)?;
        self.transition(RequestStatus::Cancelled, now)?;
        for bid in &mut self.bids {
            if bid.status == BidStatus::Accepted {
                bid.status = BidStatus::Withdrawn;
            }
        }
        self.awarded_servian = None;
        if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
            self.description = format!("{}\n\nCancellation reason: {}", self.description, reason);
        }
        self.cancelled_at = Some(now);
        Ok(self.bidders())
    }

    /// Move AWARDED to COMPLETED, returning the servian who did the job.
    pub fn mark_completed(&mut self, customer_id: Uuid, now: DateTime<Utc>) -> Result<Uuid, MarketError> {
        self.ensure_owner(customer_id)?;
        let servian = self
            .awarded_servian
            .ok_or_else(|| MarketError::conflict(format!("request is {}, not AWARDED", self.status)))?;
        self.transition(RequestStatus::Completed, now)?;
        self.completed_at = Some(now);
        Ok(servian)
    }

    pub fn is_close_eligible(&self, now: DateTime<Utc>, auto_close_days: i64) -> bool {
        self.status == RequestStatus::Active
            && self.bids.is_empty()
            && now - self.created_at >= Duration::days(auto_close_days)
    }

    pub fn close_if_expired(&mut self, now: DateTime<Utc>, auto_close_days: i64) -> Result<(), MarketError> {
        if !self.is_close_eligible(now, auto_close_days) {
            return Err(MarketError::conflict("request is not eligible for auto-close"));
        }
        self.transition(RequestStatus::Closed, now)
    }

    /// Edit an ACTIVE request that nobody has bid on yet.
    pub fn apply_update(&mut self, customer_id: Uuid, patch: RequestPatch, now: DateTime<Utc>) -> Result<(), MarketError> {
        self.ensure_owner(customer_id)?;
        if self.status != RequestStatus::Active {
            return Err(MarketError::conflict(format!("request is {}, not ACTIVE", self.status)));
        }
        if !self.bids.is_empty() {
            return Err(MarketError::conflict("cannot edit a request that already has bids"));
        }
        if let Some(title) = &patch.title { check_title(title)?; }
        if let Some(description) = &patch.description { check_description(description)?; }
        if let Some(budget) = &patch.budget { budget.validate()?; }
        check_not_past(patch.preferred_date, now)?;

        if let Some(title) = patch.title { self.title = title.trim().to_string(); }
        if let Some(description) = patch.description { self.description = description.trim().to_string(); }
        if let Some(budget) = patch.budget { self.budget = budget; }
        if let Some(urgency) = patch.urgency { self.urgency = urgency; }
        if let Some(date) = patch.preferred_date { self.preferred_date = Some(date); }
        if let Some(images) = patch.images { self.images = images; }
        self.updated_at = now;
        Ok(())
    }

    /// Attach the customer's review to a COMPLETED request and return the reviewed servian.
    pub fn record_review(&mut self, reviewer_id: Uuid, rating: u8, comment: &str, now: DateTime<Utc>) -> Result<Uuid, MarketError> {
        self.ensure_owner(reviewer_id)?;
        if self.status != RequestStatus::Completed {
            return Err(MarketError::conflict("only completed requests can be reviewed"));
        }
        if self.review.is_some() {
            return Err(MarketError::AlreadyReviewed);
        }
        if !(1..=5).contains(&rating) {
            return Err(MarketError::validation("rating must be between 1 and 5"));
        }
        if comment.chars().count() > REVIEW_COMMENT_MAX {
            return Err(MarketError::validation(format!("comment cannot exceed {REVIEW_COMMENT_MAX} characters")));
        }
        let servian = self
            .awarded_servian
            .ok_or_else(|| MarketError::conflict("completed request has no awarded servian"))?;
        self.review = Some(RequestReview { rating, comment: comment.trim().to_string(), created_at: now });
        self.updated_at = now;
        Ok(servian)
    }

    /// Whole days left in the bidding window, `None` once bidding is over.
    pub fn time_left_days(&self, now: DateTime<Utc>, auto_close_days: i64) -> Option<i64> {
        if self.status != RequestStatus::Active {
            return None;
        }
        let elapsed = (now - self.created_at).num_days();
        Some((auto_close_days - elapsed).max(0))
    }

    /// Structural invariants that every committed state satisfies.
    pub fn invariants_hold(&self) -> bool {
        let accepted: Vec<&Bid> = self.bids.iter().filter(|b| b.status == BidStatus::Accepted).collect();
        let mut servians = self.bidders();
        servians.sort_unstable();
        servians.dedup();

        self.budget.min < self.budget.max
            && self.total_bids as usize == self.bids.len()
            && servians.len() == self.bids.len()
            && accepted.len() <= 1
            && self.status.has_award() == self.awarded_servian.is_some()
            && self.status.has_award() == (accepted.len() == 1)
            && accepted.first().map(|b| b.servian_id) == self.awarded_servian
    }

    /// Copy suitable for a servian: only their own bid is visible.
    pub fn visible_to_servian(&self, servian_id: Uuid) -> ServiceRequest {
        let mut view = self.clone();
        view.bids.retain(|b| b.servian_id == servian_id);
        view
    }
}

/// A request as returned to clients, with the derived bidding countdown.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    #[serde(flatten)]
    pub request: ServiceRequest,
    pub time_left: Option<i64>,
}

impl RequestView {
    pub fn new(request: ServiceRequest, now: DateTime<Utc>, auto_close_days: i64) -> Self {
        let time_left = request.time_left_days(now, auto_close_days);
        Self { request, time_left }
    }
}
