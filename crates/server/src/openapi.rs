//! OpenAPI document. Request bodies are described by the `*Doc` mirrors below
//! so the service crate stays free of documentation derives.

use utoipa::OpenApi;
use utoipa::ToSchema;

#[derive(ToSchema)]
pub struct HealthResponse { pub status: String }

#[derive(ToSchema)]
pub struct BudgetDoc { pub min: i64, pub max: i64 }

#[derive(ToSchema)]
pub struct LocationDoc {
    pub address: String,
    pub area: Option<String>,
    pub city: Option<String>,
    /// `[longitude, latitude]`
    pub coordinates: Option<Vec<f64>>,
}

#[derive(ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct NewRequestDoc {
    pub title: String,
    pub description: String,
    /// e.g. `PLUMBING`, `ELECTRICAL`, `AC_REPAIR`
    pub service_category: String,
    pub location: LocationDoc,
    /// `LOW | MEDIUM | HIGH | EMERGENCY`
    pub urgency: Option<String>,
    pub preferred_date: Option<String>,
    pub budget: BudgetDoc,
    pub images: Option<Vec<String>>,
}

#[derive(ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct RequestPatchDoc {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<BudgetDoc>,
    pub urgency: Option<String>,
    pub preferred_date: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(ToSchema)]
pub struct MaterialDoc { pub item: String, pub cost: Option<i64> }

#[derive(ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct BidInputDoc {
    pub amount: i64,
    pub message: Option<String>,
    pub estimated_duration: Option<String>,
    pub materials: Option<Vec<MaterialDoc>>,
    pub proposed_date: Option<String>,
}

#[derive(ToSchema)]
#[schema(rename_all = "camelCase")]
pub struct BidPatchDoc {
    pub amount: Option<i64>,
    pub message: Option<String>,
    pub estimated_duration: Option<String>,
    pub materials: Option<Vec<MaterialDoc>>,
    pub proposed_date: Option<String>,
}

#[derive(ToSchema)]
pub struct ReviewInputDoc { pub rating: u8, pub comment: Option<String> }

#[derive(ToSchema)]
pub struct ProfileInputDoc {
    pub name: String,
    pub email: String,
    /// Tagged by `role`: `{"role": "customer", "tier": ...}` or `{"role": "servian", "skills": [...]}`.
    #[schema(value_type = Object)]
    pub profile: serde_json::Value,
}

#[derive(ToSchema)]
pub struct ErrorDoc { pub success: bool, pub message: String, pub code: u16 }

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::requests::create,
        crate::routes::requests::list_mine,
        crate::routes::requests::stats,
        crate::routes::requests::list_open,
        crate::routes::requests::get,
        crate::routes::requests::update,
        crate::routes::requests::cancel,
        crate::routes::requests::complete,
        crate::routes::requests::place_bid,
        crate::routes::requests::update_bid,
        crate::routes::requests::withdraw_bid,
        crate::routes::requests::accept_bid,
        crate::routes::requests::review,
        crate::routes::servian::bids,
        crate::routes::servian::jobs,
        crate::routes::servian::stats,
        crate::routes::profiles::upsert_me,
        crate::routes::profiles::get,
    ),
    components(
        schemas(
            HealthResponse,
            BudgetDoc,
            LocationDoc,
            NewRequestDoc,
            RequestPatchDoc,
            MaterialDoc,
            BidInputDoc,
            BidPatchDoc,
            ReviewInputDoc,
            ProfileInputDoc,
            ErrorDoc,
        )
    ),
    tags(
        (name = "health"),
        (name = "requests"),
        (name = "bids"),
        (name = "servian"),
        (name = "profiles")
    )
)]
pub struct ApiDoc;
