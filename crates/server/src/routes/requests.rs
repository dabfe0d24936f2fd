use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use common::pagination::{Page, Pagination};
use common::types::ApiResponse;
use serde::Deserialize;
use service::domain::{
    Bid, BidInput, BidPatch, NewRequest, RequestPatch, RequestStatus, RequestView, Review, ReviewInput,
    ServiceCategory, ServiceRequest, Urgency,
};
use service::repository::OpenRequestFilter;
use service::request_store::CustomerStats;
use uuid::Uuid;

use crate::auth::{Principal, ServerState};
use crate::errors::JsonApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

type ApiResult<T> = Result<Json<ApiResponse<T>>, JsonApiError>;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct OpenQuery {
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub budget: Option<i64>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn paging(page: Option<u32>, limit: Option<u32>) -> Pagination {
    let d = Pagination::default();
    Pagination { page: page.unwrap_or(d.page), per_page: limit.unwrap_or(d.per_page) }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

#[utoipa::path(post, path = "/service-requests", tag = "requests", request_body = crate::openapi::NewRequestDoc,
    responses((status = 201, description = "Created"), (status = 400, description = "Bad Request"), (status = 429, description = "Weekly quota exceeded")))]
pub async fn create(
    State(state): State<ServerState>,
    principal: Principal,
    ApiJson(input): ApiJson<NewRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ServiceRequest>>), JsonApiError> {
    let customer = principal.customer()?;
    let request = state.ctx.requests.create(customer, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message("Service request created successfully", request))))
}

#[utoipa::path(get, path = "/service-requests", tag = "requests",
    params(("status" = Option<String>, Query, description = "Filter by status"), ("page" = Option<u32>, Query, description = "Page number, 1-based"), ("limit" = Option<u32>, Query, description = "Page size")),
    responses((status = 200, description = "Own requests, newest first")))]
pub async fn list_mine(
    State(state): State<ServerState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<ListQuery>,
) -> ApiResult<Page<RequestView>> {
    let customer = principal.customer()?;
    let status = q.status.as_deref().map(str::parse::<RequestStatus>).transpose()?;
    let page = state.ctx.requests.list_for_customer(customer, status, paging(q.page, q.limit)).await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[utoipa::path(get, path = "/service-requests/stats", tag = "requests", responses((status = 200, description = "Counts per status")))]
pub async fn stats(State(state): State<ServerState>, principal: Principal) -> ApiResult<CustomerStats> {
    let customer = principal.customer()?;
    Ok(Json(ApiResponse::ok(state.ctx.requests.customer_stats(customer).await?)))
}

#[utoipa::path(get, path = "/service-requests/open", tag = "requests",
    params(("category" = Option<String>, Query, description = "Service category"), ("urgency" = Option<String>, Query, description = "Urgency level"), ("budget" = Option<i64>, Query, description = "Minimum budget max")),
    responses((status = 200, description = "Open requests, most urgent first")))]
pub async fn list_open(
    State(state): State<ServerState>,
    principal: Principal,
    ApiQuery(q): ApiQuery<OpenQuery>,
) -> ApiResult<Page<RequestView>> {
    let servian = principal.servian()?;
    let filter = OpenRequestFilter {
        category: q.category.as_deref().map(str::parse::<ServiceCategory>).transpose()?,
        urgency: q.urgency.as_deref().map(str::parse::<Urgency>).transpose()?,
        min_budget: q.budget,
    };
    let page = state.ctx.requests.list_open(servian, filter, paging(q.page, q.limit)).await?;
    Ok(Json(ApiResponse::ok(page)))
}

#[utoipa::path(get, path = "/service-requests/{id}", tag = "requests", params(("id" = Uuid, Path, description = "Service request id")),
    responses((status = 200, description = "Found"), (status = 404, description = "Not Found")))]
pub async fn get(State(state): State<ServerState>, principal: Principal, ApiPath(id): ApiPath<Uuid>) -> ApiResult<RequestView> {
    Ok(Json(ApiResponse::ok(state.ctx.requests.get(principal.0, id).await?)))
}

#[utoipa::path(put, path = "/service-requests/{id}", tag = "requests", params(("id" = Uuid, Path, description = "Service request id")), request_body = crate::openapi::RequestPatchDoc,
    responses((status = 200, description = "Updated"), (status = 409, description = "Already has bids or no longer active")))]
pub async fn update(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<RequestPatch>,
) -> ApiResult<RequestView> {
    let customer = principal.customer()?;
    let view = state.ctx.requests.update(customer, id, patch).await?;
    Ok(Json(ApiResponse::with_message("Service request updated successfully", view)))
}

#[utoipa::path(put, path = "/service-requests/{id}/cancel", tag = "requests", params(("id" = Uuid, Path, description = "Service request id")),
    responses((status = 200, description = "Cancelled"), (status = 409, description = "Illegal transition")))]
pub async fn cancel(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<Json<CancelBody>>,
) -> ApiResult<ServiceRequest> {
    let customer = principal.customer()?;
    let reason = body.and_then(|Json(b)| b.reason);
    let request = state.ctx.awards.cancel(customer, id, reason).await?;
    Ok(Json(ApiResponse::with_message("Service request cancelled successfully", request)))
}

#[utoipa::path(put, path = "/service-requests/{id}/complete", tag = "requests", params(("id" = Uuid, Path, description = "Service request id")),
    responses((status = 200, description = "Completed"), (status = 409, description = "Not awarded")))]
pub async fn complete(State(state): State<ServerState>, principal: Principal, ApiPath(id): ApiPath<Uuid>) -> ApiResult<ServiceRequest> {
    let customer = principal.customer()?;
    let request = state.ctx.awards.complete(customer, id).await?;
    Ok(Json(ApiResponse::with_message("Service marked as completed", request)))
}

#[utoipa::path(post, path = "/service-requests/{id}/bid", tag = "bids", params(("id" = Uuid, Path, description = "Service request id")), request_body = crate::openapi::BidInputDoc,
    responses((status = 201, description = "Bid placed"), (status = 400, description = "Duplicate or out of range"), (status = 409, description = "Request not active")))]
pub async fn place_bid(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<BidInput>,
) -> Result<(StatusCode, Json<ApiResponse<Bid>>), JsonApiError> {
    let servian = principal.servian()?;
    let bid = state.ctx.bids.place(servian, id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message("Bid placed successfully", bid))))
}

#[utoipa::path(put, path = "/service-requests/{id}/bid", tag = "bids", params(("id" = Uuid, Path, description = "Service request id")), request_body = crate::openapi::BidPatchDoc,
    responses((status = 200, description = "Bid updated"), (status = 404, description = "No bid")))]
pub async fn update_bid(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<BidPatch>,
) -> ApiResult<Bid> {
    let servian = principal.servian()?;
    let bid = state.ctx.bids.update(servian, id, patch).await?;
    Ok(Json(ApiResponse::with_message("Bid updated successfully", bid)))
}

#[utoipa::path(delete, path = "/service-requests/{id}/bid", tag = "bids", params(("id" = Uuid, Path, description = "Service request id")),
    responses((status = 200, description = "Bid withdrawn"), (status = 404, description = "No pending bid")))]
pub async fn withdraw_bid(State(state): State<ServerState>, principal: Principal, ApiPath(id): ApiPath<Uuid>) -> ApiResult<()> {
    let servian = principal.servian()?;
    state.ctx.bids.withdraw(servian, id).await?;
    Ok(Json(ApiResponse::with_message("Bid withdrawn successfully", ())))
}

#[utoipa::path(put, path = "/service-requests/{id}/accept-bid/{bid_id}", tag = "bids",
    params(("id" = Uuid, Path, description = "Service request id"), ("bid_id" = Uuid, Path, description = "Bid id")),
    responses((status = 200, description = "Awarded"), (status = 409, description = "Already awarded")))]
pub async fn accept_bid(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath((id, bid_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<ServiceRequest> {
    let customer = principal.customer()?;
    let request = state.ctx.awards.accept(customer, id, bid_id).await?;
    Ok(Json(ApiResponse::with_message("Bid accepted successfully", request)))
}

#[utoipa::path(post, path = "/service-requests/{id}/review", tag = "requests", params(("id" = Uuid, Path, description = "Service request id")), request_body = crate::openapi::ReviewInputDoc,
    responses((status = 201, description = "Review recorded"), (status = 400, description = "Already reviewed")))]
pub async fn review(
    State(state): State<ServerState>,
    principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ReviewInput>,
) -> Result<(StatusCode, Json<ApiResponse<Review>>), JsonApiError> {
    let customer = principal.customer()?;
    let review = state.ctx.reviews.record_review(customer, id, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message("Review submitted successfully", review))))
}
