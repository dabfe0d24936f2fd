use axum::extract::State;
use axum::Json;
use common::types::ApiResponse;
use service::domain::UserAccount;
use service::profiles::ProfileInput;
use uuid::Uuid;

use crate::auth::{Principal, ServerState};
use crate::errors::JsonApiError;
use crate::extract::{ApiJson, ApiPath};

#[utoipa::path(put, path = "/profiles/me", tag = "profiles", request_body = crate::openapi::ProfileInputDoc,
    responses((status = 200, description = "Saved"), (status = 400, description = "Profile does not match role")))]
pub async fn upsert_me(
    State(state): State<ServerState>,
    principal: Principal,
    ApiJson(input): ApiJson<ProfileInput>,
) -> Result<Json<ApiResponse<UserAccount>>, JsonApiError> {
    let account = state.ctx.profiles.upsert_own(principal.0, input).await?;
    Ok(Json(ApiResponse::with_message("Profile saved", account)))
}

#[utoipa::path(get, path = "/profiles/{id}", tag = "profiles", params(("id" = Uuid, Path, description = "Account id")),
    responses((status = 200, description = "Found"), (status = 404, description = "Not Found")))]
pub async fn get(
    State(state): State<ServerState>,
    _principal: Principal,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<UserAccount>>, JsonApiError> {
    Ok(Json(ApiResponse::ok(state.ctx.profiles.get(id).await?)))
}
