use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use crate::models::{
    InboundEmailRequest, LadderResponse, LinkDecisionRequest, LinkSuggestionDto, StoredLinkDto,
};
use crate::services::linking::LinkCandidate;
use crate::utils::{ApiError, ApiResult};

fn to_dto(
    state: &AppState,
    thread_id: Uuid,
    candidate: &LinkCandidate,
    confidence: crate::models::LinkConfidence,
    is_primary: bool,
) -> LinkSuggestionDto {
    LinkSuggestionDto {
        thread_id,
        object_type: candidate.object_type.clone(),
        object_id: candidate.object_id,
        label: candidate.label.clone(),
        confidence,
        is_primary,
        score: candidate.score,
        score_breakdown: candidate.breakdown(state.linking_ladder.scoring().config()),
        suggested_reason: candidate.reason.suggested_reason(),
        ambiguous: candidate.ambiguous,
    }
}

/// Run the linking ladder for an inbound thread and persist suggestions.
#[utoipa::path(
    post,
    path = "/api/links/suggest",
    request_body = InboundEmailRequest,
    responses(
        (status = 200, description = "Ladder outcome with primary and alternates", body = LadderResponse),
        (status = 400, description = "Validation error")
    ),
    tag = "Links"
)]
pub async fn suggest_links(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InboundEmailRequest>,
) -> ApiResult<Json<LadderResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;
    if request.yacht_id.is_nil() {
        return Err(ApiError::validation_error("yacht_id must be a valid tenant id"));
    }

    let outcome = state.linking_ladder.determine_primary(&request).await?;
    let created = state.linking_ladder.persist_suggestions(&request, &outcome).await?;

    tracing::info!(
        thread = %request.thread_id,
        level = outcome.level.label(),
        action = outcome.action.label(),
        rows = created.len(),
        "ladder complete"
    );

    let primary = outcome
        .primary
        .as_ref()
        .map(|c| to_dto(&state, request.thread_id, c, outcome.confidence, true));
    let alternates = outcome
        .alternates
        .iter()
        .map(|c| {
            to_dto(&state, request.thread_id, c, crate::models::LinkConfidence::Suggested, false)
        })
        .collect();

    Ok(Json(LadderResponse {
        level: outcome.level.label().to_string(),
        action: outcome.action.label().to_string(),
        primary,
        alternates,
    }))
}

/// Record a user decision on a suggestion.
#[utoipa::path(
    post,
    path = "/api/links/decision",
    request_body = LinkDecisionRequest,
    responses(
        (status = 200, description = "Decision recorded"),
        (status = 400, description = "Validation error")
    ),
    tag = "Links"
)]
pub async fn record_decision(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LinkDecisionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|e| ApiError::validation_error(e.to_string()))?;

    let id = state.linking_ladder.record_decision(&request).await?;
    Ok(Json(json!({ "decision_id": id })))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ThreadLinksQuery {
    pub yacht_id: Uuid,
}

/// Stored suggestions for a thread, primary first.
#[utoipa::path(
    get,
    path = "/api/links/{thread_id}",
    params(
        ("thread_id" = String, Path, description = "Email thread id"),
        ThreadLinksQuery
    ),
    responses(
        (status = 200, description = "Stored link suggestions", body = Vec<StoredLinkDto>)
    ),
    tag = "Links"
)]
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<ThreadLinksQuery>,
) -> ApiResult<Json<Vec<StoredLinkDto>>> {
    let links = state
        .db
        .list_link_suggestions(query.yacht_id, thread_id)
        .await
        .map_err(|e| ApiError::Database(e.to_string()))?;
    Ok(Json(links))
}
