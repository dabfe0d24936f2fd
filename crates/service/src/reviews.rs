use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::commit::Committer;
use crate::domain::{RatingSummary, Review, ReviewInput, ReviewRole};
use crate::errors::MarketError;
use crate::repository::{ProfileRepository, ReviewRepository};

/// Records post-completion reviews and keeps servian ratings current.
#[derive(Clone)]
pub struct ReviewAggregator {
    committer: Committer,
    reviews: Arc<dyn ReviewRepository>,
    profiles: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
}

impl ReviewAggregator {
    pub fn new(
        committer: Committer,
        reviews: Arc<dyn ReviewRepository>,
        profiles: Arc<dyn ProfileRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { committer, reviews, profiles, clock }
    }

    /// Store the review, mark the request reviewed and recompute the
    /// servian's rating as the mean over every rating they ever received.
    ///
    /// The review row goes in first: its per-request uniqueness is the
    /// single-review guard. When the request flag cannot be committed the row
    /// is taken back out, so a failed attempt leaves nothing behind.
    #[instrument(skip(self, input), fields(request_id = %request_id, reviewer_id = %reviewer_id, rating = input.rating))]
    pub async fn record_review(&self, reviewer_id: Uuid, request_id: Uuid, input: ReviewInput) -> Result<Review, MarketError> {
        let now = self.clock.now();
        let mut draft = self.committer.load(request_id).await?;
        let servian_id = draft.record_review(reviewer_id, input.rating, &input.comment, now)?;
        let review = Review {
            id: Uuid::new_v4(),
            request_id,
            reviewer_id,
            reviewee_id: servian_id,
            rating: input.rating,
            comment: input.comment.trim().to_string(),
            role: ReviewRole::Customer,
            created_at: now,
        };
        self.reviews.insert(&review).await?;

        let committed = self
            .committer
            .apply(request_id, |r, now| r.record_review(reviewer_id, input.rating, &input.comment, now))
            .await;
        if let Err(err) = committed {
            if let Err(cleanup) = self.reviews.remove_for_request(request_id).await {
                warn!(error = %cleanup, "could not remove review after failed commit");
            }
            return Err(err);
        }

        match self.refresh_rating(servian_id).await {
            Ok(summary) => info!(
                event = "review_recorded",
                servian_id = %servian_id,
                average_rating = summary.average_rating,
                total_reviews = summary.total_reviews,
                "review recorded"
            ),
            // the review itself is committed; the next review recomputes the full mean
            Err(err) => warn!(event = "rating_refresh_failed", servian_id = %servian_id, error = %err, "review recorded"),
        }
        Ok(review)
    }

    /// Full scan-and-average over the servian's ratings, stored on their profile.
    pub async fn refresh_rating(&self, servian_id: Uuid) -> Result<RatingSummary, MarketError> {
        let ratings = self.reviews.ratings_for(servian_id).await?;
        let summary = RatingSummary::from_ratings(&ratings);
        self.profiles.store_rating(servian_id, summary, self.clock.now()).await?;
        Ok(summary)
    }
}
