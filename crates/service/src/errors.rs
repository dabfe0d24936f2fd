use thiserror::Error;

/// Business errors raised by the marketplace core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("bid not found")]
    BidNotFound,
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("you have already placed a bid on this request")]
    DuplicateBid,
    #[error("bid amount must be between {min} and {max}")]
    OutOfRange { min: i64, max: i64 },
    #[error("service request is no longer accepting bids")]
    RequestNotActive,
    #[error("proposed date cannot be in the past")]
    InvalidDate,
    #[error("weekly request limit reached ({remaining} remaining)")]
    QuotaExceeded { remaining: u32 },
    #[error("service request has already been reviewed")]
    AlreadyReviewed,
    #[error("not permitted")]
    Authorization,
    #[error("repository error: {0}")]
    Repository(String),
}

impl MarketError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(entity.to_string()) }

    pub fn conflict(detail: impl Into<String>) -> Self { Self::StateConflict(detail.into()) }

    pub fn validation(detail: impl Into<String>) -> Self { Self::Validation(detail.into()) }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            MarketError::Validation(_) => 2001,
            MarketError::NotFound(_) => 2002,
            MarketError::BidNotFound => 2003,
            MarketError::StateConflict(_) => 2004,
            MarketError::DuplicateBid => 2005,
            MarketError::OutOfRange { .. } => 2006,
            MarketError::RequestNotActive => 2007,
            MarketError::InvalidDate => 2008,
            MarketError::QuotaExceeded { .. } => 2009,
            MarketError::AlreadyReviewed => 2010,
            MarketError::Authorization => 2011,
            MarketError::Repository(_) => 2200,
        }
    }
}

impl From<sea_orm::DbErr> for MarketError {
    fn from(e: sea_orm::DbErr) -> Self { MarketError::Repository(e.to_string()) }
}

impl From<models::errors::ModelError> for MarketError {
    fn from(e: models::errors::ModelError) -> Self {
        match e {
            models::errors::ModelError::Validation(msg) => MarketError::Validation(msg),
            models::errors::ModelError::Db(msg) => MarketError::Repository(msg),
        }
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self { MarketError::Repository(format!("corrupt document: {e}")) }
}
