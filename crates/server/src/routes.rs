use axum::{
    routing::{get, put},
    Json, Router,
};
use common::types::Health;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::ServerState;
use crate::openapi::ApiDoc;

pub mod profiles;
pub mod requests;
pub mod servian;

#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, description = "OK", body = crate::openapi::HealthResponse)))]
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Build the full application router: health, marketplace API and docs.
pub fn build_router(state: ServerState, cors: CorsLayer) -> Router {
    let requests = Router::new()
        .route("/service-requests", get(requests::list_mine).post(requests::create))
        .route("/service-requests/stats", get(requests::stats))
        .route("/service-requests/open", get(requests::list_open))
        .route("/service-requests/:id", get(requests::get).put(requests::update))
        .route("/service-requests/:id/cancel", put(requests::cancel))
        .route("/service-requests/:id/complete", put(requests::complete))
        .route(
            "/service-requests/:id/bid",
            axum::routing::post(requests::place_bid).put(requests::update_bid).delete(requests::withdraw_bid),
        )
        .route("/service-requests/:id/accept-bid/:bid_id", put(requests::accept_bid))
        .route("/service-requests/:id/review", axum::routing::post(requests::review));

    let servian = Router::new()
        .route("/servian/bids", get(servian::bids))
        .route("/servian/jobs", get(servian::jobs))
        .route("/servian/stats", get(servian::stats));

    let profiles = Router::new()
        .route("/profiles/me", put(profiles::upsert_me))
        .route("/profiles/:id", get(profiles::get));

    Router::new()
        .route("/health", get(health))
        .merge(requests)
        .merge(servian)
        .merge(profiles)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
