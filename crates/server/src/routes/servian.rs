use axum::extract::State;
use axum::Json;
use common::types::ApiResponse;
use serde::Deserialize;
use service::domain::{BidStatus, RequestStatus, RequestView};
use service::request_store::{ServianBidView, ServianStats};

use crate::auth::{Principal, ServerState};
use crate::errors::JsonApiError;
use crate::extract::ApiQuery;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[utoipa::path(get, path = "/servian/bids", tag = "servian", params(("status" = Option<String>, Query, description = "Filter by bid or request status")),
    responses((status = 200, description = "Own bids with their requests")))]
pub async fn bids(
    State(state): State<ServerState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<StatusQuery>,
) -> Result<Json<ApiResponse<Vec<ServianBidView>>>, JsonApiError> {
    let servian = principal.servian()?;
    let status = q.status.as_deref().map(str::parse::<BidStatus>).transpose()?;
    Ok(Json(ApiResponse::ok(state.ctx.requests.servian_bids(servian, status).await?)))
}

#[utoipa::path(get, path = "/servian/jobs", tag = "servian", params(("status" = Option<String>, Query, description = "Filter by bid or request status")),
    responses((status = 200, description = "Requests awarded to the caller")))]
pub async fn jobs(
    State(state): State<ServerState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<StatusQuery>,
) -> Result<Json<ApiResponse<Vec<RequestView>>>, JsonApiError> {
    let servian = principal.servian()?;
    let status = q.status.as_deref().map(str::parse::<RequestStatus>).transpose()?;
    Ok(Json(ApiResponse::ok(state.ctx.requests.servian_jobs(servian, status).await?)))
}

#[utoipa::path(get, path = "/servian/stats", tag = "servian", responses((status = 200, description = "Bid and job counts")))]
pub async fn stats(State(state): State<ServerState>, principal: Principal) -> Result<Json<ApiResponse<ServianStats>>, JsonApiError> {
    let servian = principal.servian()?;
    Ok(Json(ApiResponse::ok(state.ctx.requests.servian_stats(servian).await?)))
}
