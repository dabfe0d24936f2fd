//! Domain types shared by the marketplace services.

pub mod profile;
pub mod request;
pub mod review;

pub use profile::{Actor, Profile, RatingSummary, Role, SubscriptionTier, UserAccount};
pub use request::{
    AwardOutcome, Bid, BidInput, BidPatch, BidStatus, Budget, Location, NewRequest, RequestPatch, RequestStatus,
    RequestView, ServiceCategory, ServiceRequest, Urgency,
};
pub use review::{Review, ReviewInput, ReviewRole};
