use axum::Json;
use axum::extract::State;
use std::sync::Arc;
use validator::Validate;

use crate::AppState;
use crate::models::{SearchRequest, SearchResponse};
use crate::utils::{ApiError, ApiResult};

/// Federated search over the maintenance database.
#[utoipa::path(
    post,
    path = "/api/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked, deduplicated rows", body = SearchResponse),
        (status = 400, description = "Validation error"),
        (status = 503, description = "Probe queue overloaded")
    ),
    tag = "Search"
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let response = state.search_service.search(request).await?;
    Ok(Json(response))
}
