use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::pagination::{Page, PageInfo, Pagination};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, Statement, Value,
};
use uuid::Uuid;

use models::{notification, request_quota, review, service_request, user_profile};

use crate::domain::profile::ServianProfile;
use crate::domain::{BidStatus, Profile, RatingSummary, RequestStatus, Review, ServiceRequest, UserAccount};
use crate::errors::MarketError;
use crate::notify::{Notification, NotificationSink};
use crate::repository::{OpenRequestFilter, ProfileRepository, QuotaStore, RequestRepository, ReviewRepository};

fn to_active_model(r: &ServiceRequest) -> Result<service_request::ActiveModel, MarketError> {
    Ok(service_request::ActiveModel {
        id: Set(r.id),
        customer_id: Set(r.customer_id),
        title: Set(r.title.clone()),
        description: Set(r.description.clone()),
        service_category: Set(r.service_category.as_str().to_string()),
        location: Set(serde_json::to_value(&r.location)?),
        urgency: Set(r.urgency.as_str().to_string()),
        urgency_rank: Set(r.urgency.rank()),
        preferred_date: Set(r.preferred_date.map(Into::into)),
        budget_min: Set(r.budget.min),
        budget_max: Set(r.budget.max),
        images: Set(serde_json::to_value(&r.images)?),
        status: Set(r.status.as_str().to_string()),
        bids: Set(serde_json::to_value(&r.bids)?),
        awarded_servian: Set(r.awarded_servian),
        total_bids: Set(r.total_bids as i32),
        views: Set(r.views as i64),
        review: Set(r.review.as_ref().map(serde_json::to_value).transpose()?),
        version: Set(r.version),
        created_at: Set(r.created_at.into()),
        updated_at: Set(r.updated_at.into()),
        cancelled_at: Set(r.cancelled_at.map(Into::into)),
        completed_at: Set(r.completed_at.map(Into::into)),
    })
}

fn from_model(m: service_request::Model) -> Result<ServiceRequest, MarketError> {
    Ok(ServiceRequest {
        id: m.id,
        customer_id: m.customer_id,
        title: m.title,
        description: m.description,
        service_category: m.service_category.parse()?,
        location: serde_json::from_value(m.location)?,
        urgency: m.urgency.parse()?,
        preferred_date: m.preferred_date.map(|d| d.with_timezone(&Utc)),
        budget: crate::domain::Budget { min: m.budget_min, max: m.budget_max },
        images: serde_json::from_value(m.images)?,
        status: m.status.parse()?,
        bids: serde_json::from_value(m.bids)?,
        awarded_servian: m.awarded_servian,
        total_bids: m.total_bids.max(0) as u32,
        views: m.views.max(0) as u64,
        review: m.review.map(serde_json::from_value).transpose()?,
        version: m.version,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
        cancelled_at: m.cancelled_at.map(|d| d.with_timezone(&Utc)),
        completed_at: m.completed_at.map(|d| d.with_timezone(&Utc)),
    })
}

fn from_models(rows: Vec<service_request::Model>) -> Result<Vec<ServiceRequest>, MarketError> {
    rows.into_iter().map(from_model).collect()
}

pub struct SeaOrmRequestRepository {
    pub db: DatabaseConnection,
}

#[async_trait]
impl RequestRepository for SeaOrmRequestRepository {
    async fn insert(&self, request: &ServiceRequest) -> Result<(), MarketError> {
        service_request::Entity::insert(to_active_model(request)?).exec(&self.db).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ServiceRequest>, MarketError> {
        service_request::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(from_model)
            .transpose()
    }

    async fn compare_and_swap(&self, expected: i64, next: &ServiceRequest) -> Result<bool, MarketError> {
        let mut am = to_active_model(next)?;
        am.id = NotSet;
        am.views = NotSet;
        am.created_at = NotSet;
        am.version = Set(expected + 1);
        let res = service_request::Entity::update_many()
            .set(am)
            .filter(service_request::Column::Id.eq(next.id))
            .filter(service_request::Column::Version.eq(expected))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected == 1)
    }

    async fn increment_views(&self, id: Uuid) -> Result<(), MarketError> {
        service_request::Entity::update_many()
            .col_expr(service_request::Column::Views, Expr::col(service_request::Column::Views).add(1))
            .filter(service_request::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<RequestStatus>,
        page: Pagination,
    ) -> Result<Page<ServiceRequest>, MarketError> {
        let mut query = service_request::Entity::find().filter(service_request::Column::CustomerId.eq(customer_id));
        if let Some(status) = status {
            query = query.filter(service_request::Column::Status.eq(status.as_str()));
        }
        let (idx, per) = page.normalize();
        let paginator = query
            .order_by_desc(service_request::Column::CreatedAt)
            .order_by_desc(service_request::Column::Id)
            .paginate(&self.db, per);
        let total = paginator.num_items().await?;
        let items = from_models(paginator.fetch_page(idx).await?)?;
        Ok(Page { items, pagination: PageInfo::new(page, total) })
    }

    async fn status_summary(&self, customer_id: Uuid) -> Result<Vec<(RequestStatus, u32)>, MarketError> {
        let rows: Vec<(String, i32)> = service_request::Entity::find()
            .select_only()
            .column(service_request::Column::Status)
            .column(service_request::Column::TotalBids)
            .filter(service_request::Column::CustomerId.eq(customer_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        rows.into_iter()
            .map(|(status, bids)| Ok((status.parse()?, bids.max(0) as u32)))
            .collect()
    }

    async fn list_open(&self, filter: &OpenRequestFilter, page: Pagination) -> Result<Page<ServiceRequest>, MarketError> {
        let mut query = service_request::Entity::find()
            .filter(service_request::Column::Status.eq(RequestStatus::Active.as_str()));
        if let Some(category) = filter.category {
            query = query.filter(service_request::Column::ServiceCategory.eq(category.as_str()));
        }
        if let Some(urgency) = filter.urgency {
            query = query.filter(service_request::Column::Urgency.eq(urgency.as_str()));
        }
        if let Some(min_budget) = filter.min_budget {
            query = query.filter(service_request::Column::BudgetMax.gte(min_budget));
        }
        let (idx, per) = page.normalize();
        let paginator = query
            .order_by_desc(service_request::Column::UrgencyRank)
            .order_by_desc(service_request::Column::CreatedAt)
            .order_by_desc(service_request::Column::Id)
            .paginate(&self.db, per);
        let total = paginator.num_items().await?;
        let items = from_models(paginator.fetch_page(idx).await?)?;
        Ok(Page { items, pagination: PageInfo::new(page, total) })
    }

    async fn list_by_servian_bids(
        &self,
        servian_id: Uuid,
        bid_status: Option<BidStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError> {
        // jsonb containment: some element of `bids` has this servian (and status)
        let mut pattern = serde_json::json!({ "servianId": servian_id });
        if let Some(status) = bid_status {
            pattern["status"] = serde_json::Value::from(status.as_str());
        }
        let pattern = serde_json::Value::Array(vec![pattern]).to_string();
        let rows = service_request::Entity::find()
            .filter(Expr::cust_with_values("bids @> CAST($1 AS jsonb)", [pattern]))
            .order_by_desc(service_request::Column::CreatedAt)
            .all(&self.db)
            .await?;
        from_models(rows)
    }

    async fn list_awarded_to(
        &self,
        servian_id: Uuid,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>, MarketError> {
        let mut query = service_request::Entity::find()
            .filter(service_request::Column::AwardedServian.eq(servian_id));
        if let Some(status) = status {
            query = query.filter(service_request::Column::Status.eq(status.as_str()));
        }
        let rows = query
            .order_by_desc(service_request::Column::UpdatedAt)
            .all(&self.db)
            .await?;
        from_models(rows)
    }

    async fn find_close_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, MarketError> {
        let cutoff: sea_orm::prelude::DateTimeWithTimeZone = cutoff.into();
        let ids: Vec<Uuid> = service_request::Entity::find()
            .select_only()
            .column(service_request::Column::Id)
            .filter(service_request::Column::Status.eq(RequestStatus::Active.as_str()))
            .filter(service_request::Column::TotalBids.eq(0))
            .filter(service_request::Column::CreatedAt.lte(cutoff))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(ids)
    }
}

const RESERVE_SQL: &str = r#"
INSERT INTO request_quota (customer_id, window_start, used)
SELECT $1::uuid, $2::timestamptz, 1
WHERE $3::int IS NULL OR $3::int > 0
ON CONFLICT (customer_id) DO UPDATE SET
    used = CASE WHEN request_quota.window_start = EXCLUDED.window_start
                THEN request_quota.used + 1 ELSE 1 END,
    window_start = EXCLUDED.window_start
WHERE request_quota.window_start <> EXCLUDED.window_start
   OR $3::int IS NULL
   OR request_quota.used < $3::int
RETURNING used
"#;

const STORE_RATING_SQL: &str = r#"
INSERT INTO user_profile (id, email, name, role, profile, created_at, updated_at)
VALUES ($1, '', '', 'servian', $2, $3, $3)
ON CONFLICT (id) DO UPDATE SET
    profile = user_profile.profile
        || jsonb_build_object('averageRating', $4::float8, 'totalReviews', $5::bigint),
    updated_at = EXCLUDED.updated_at
WHERE user_profile.role = 'servian'
  AND COALESCE((user_profile.profile->>'totalReviews')::bigint, 0) <= $5::bigint
RETURNING id
"#;

// Keeps a stored servian's rating fields when the incoming profile is also a servian one.
const KEEP_RATING_EXPR: &str = r#"CASE WHEN user_profile.role = 'servian' AND EXCLUDED.role = 'servian'
    THEN EXCLUDED.profile || jsonb_build_object(
        'averageRating', COALESCE(user_profile.profile->'averageRating', '0'::jsonb),
        'totalReviews', COALESCE(user_profile.profile->'totalReviews', '0'::jsonb))
    ELSE EXCLUDED.profile END"#;

const RELEASE_SQL: &str = r#"
UPDATE request_quota SET used = GREATEST(used - 1, 0)
WHERE customer_id = $1 AND window_start = $2
"#;

/// Quota counters kept in `request_quota`; the upsert is a single statement
/// so check and increment cannot interleave with another creation.
pub struct SeaOrmQuotaStore {
    pub db: DatabaseConnection,
}

#[async_trait]
impl QuotaStore for SeaOrmQuotaStore {
    async fn reserve(&self, customer_id: Uuid, window_start: DateTime<Utc>, cap: Option<u32>) -> Result<Option<u32>, MarketError> {
        let window: sea_orm::prelude::DateTimeWithTimeZone = window_start.into();
        let cap = cap.map(|c| i32::try_from(c).unwrap_or(i32::MAX));
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            RESERVE_SQL,
            [Value::from(customer_id), Value::from(window), Value::from(cap)],
        );
        let Some(row) = self.db.query_one(stmt).await? else {
            return Ok(None);
        };
        let used: i32 = row.try_get("", "used")?;
        Ok(Some(used.max(0) as u32))
    }

    async fn release(&self, customer_id: Uuid, window_start: DateTime<Utc>) -> Result<(), MarketError> {
        let window: sea_orm::prelude::DateTimeWithTimeZone = window_start.into();
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            RELEASE_SQL,
            [Value::from(customer_id), Value::from(window)],
        );
        self.db.execute(stmt).await?;
        Ok(())
    }
}

pub struct SeaOrmReviewRepository {
    pub db: DatabaseConnection,
}

#[async_trait]
impl ReviewRepository for SeaOrmReviewRepository {
    async fn insert(&self, r: &Review) -> Result<(), MarketError> {
        let am = review::ActiveModel {
            id: Set(r.id),
            request_id: Set(r.request_id),
            reviewer_id: Set(r.reviewer_id),
            reviewee_id: Set(r.reviewee_id),
            rating: Set(i16::from(r.rating)),
            comment: Set(r.comment.clone()),
            role: Set(r.role.as_str().to_string()),
            created_at: Set(r.created_at.into()),
        };
        match review::Entity::insert(am).exec(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(MarketError::AlreadyReviewed),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_for_request(&self, request_id: Uuid) -> Result<(), MarketError> {
        review::Entity::delete_many()
            .filter(review::Column::RequestId.eq(request_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn ratings_for(&self, servian_id: Uuid) -> Result<Vec<u8>, MarketError> {
        let ratings: Vec<i16> = review::Entity::find()
            .select_only()
            .column(review::Column::Rating)
            .filter(review::Column::RevieweeId.eq(servian_id))
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(ratings.into_iter().map(|r| r.clamp(0, 5) as u8).collect())
    }
}

pub struct SeaOrmProfileRepository {
    pub db: DatabaseConnection,
}

fn account_from_model(m: user_profile::Model) -> Result<UserAccount, MarketError> {
    Ok(UserAccount {
        id: m.id,
        name: m.name,
        email: m.email,
        profile: serde_json::from_value(m.profile)?,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

#[async_trait]
impl ProfileRepository for SeaOrmProfileRepository {
    async fn get(&self, id: Uuid) -> Result<Option<UserAccount>, MarketError> {
        user_profile::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(account_from_model)
            .transpose()
    }

    async fn upsert(&self, account: &UserAccount) -> Result<(), MarketError> {
        let am = user_profile::ActiveModel {
            id: Set(account.id),
            email: Set(account.email.clone()),
            name: Set(account.name.clone()),
            role: Set(account.role().as_str().to_string()),
            profile: Set(serde_json::to_value(&account.profile)?),
            created_at: Set(account.created_at.into()),
            updated_at: Set(account.updated_at.into()),
        };
        user_profile::Entity::insert(am)
            .on_conflict(
                OnConflict::column(user_profile::Column::Id)
                    .update_columns([
                        user_profile::Column::Email,
                        user_profile::Column::Name,
                        user_profile::Column::Role,
                        user_profile::Column::UpdatedAt,
                    ])
                    .value(user_profile::Column::Profile, Expr::cust(KEEP_RATING_EXPR))
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn store_rating(&self, servian_id: Uuid, summary: RatingSummary, now: DateTime<Utc>) -> Result<(), MarketError> {
        let bare = Profile::Servian(ServianProfile {
            average_rating: summary.average_rating,
            total_reviews: summary.total_reviews,
            ..ServianProfile::default()
        });
        let now: sea_orm::prelude::DateTimeWithTimeZone = now.into();
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            STORE_RATING_SQL,
            [
                Value::from(servian_id),
                Value::from(serde_json::to_value(&bare)?),
                Value::from(now),
                Value::from(summary.average_rating),
                Value::from(i64::from(summary.total_reviews)),
            ],
        );
        if self.db.query_one(stmt).await?.is_some() {
            return Ok(());
        }
        // nothing written: either a newer summary is already stored or the account is a customer
        match self.get(servian_id).await? {
            Some(UserAccount { profile: Profile::Customer(_), .. }) => {
                Err(MarketError::validation("reviewed account is not a servian"))
            }
            _ => Ok(()),
        }
    }
}

/// Persists notifications into the `notification` table.
pub struct SeaOrmNotificationSink {
    pub db: DatabaseConnection,
}

#[async_trait]
impl NotificationSink for SeaOrmNotificationSink {
    async fn deliver(&self, n: &Notification) -> Result<(), MarketError> {
        let request_id = n
            .data
            .get("requestId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());
        notification::create(
            &self.db,
            notification::NewNotification {
                recipient_id: n.recipient_id,
                kind: n.kind.as_str(),
                title: &n.title,
                message: &n.message,
                request_id,
            },
        )
        .await?;
        Ok(())
    }
}
