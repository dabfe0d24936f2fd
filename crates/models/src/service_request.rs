use sea_orm::entity::prelude::*;
use uuid::Uuid;
use serde::{Deserialize, Serialize};

use crate::review;

/// Persisted request aggregate. `bids`, `location`, `images` and `review`
/// are stored as jsonb documents owned by the service layer.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_request")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub service_category: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub location: Json,
    pub urgency: String,
    pub urgency_rank: i16,
    pub preferred_date: Option<DateTimeWithTimeZone>,
    pub budget_min: i64,
    pub budget_max: i64,
    #[sea_orm(column_type = "JsonBinary")]
    pub images: Json,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub bids: Json,
    pub awarded_servian: Option<Uuid>,
    pub total_bids: i32,
    pub views: i64,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub review: Option<Json>,
    pub version: i64,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation { Review }

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::Review => Entity::has_one(review::Entity).into(),
        }
    }
}

impl Related<review::Entity> for Entity {
    fn to() -> RelationDef { Relation::Review.def() }
}

impl ActiveModelBehavior for ActiveModel {}
