//! Search request/response surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::services::search::capability::EntityType;
use crate::services::search::intent::Intent;
use crate::services::search::lane::Lane;
use crate::services::search::scope::UserRole;
use crate::services::search::surface::SurfaceState;

/// A pre-extracted typed entity supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntityParam {
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub entity_type: EntityType,
    pub value: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SearchRequest {
    #[schema(value_type = String)]
    pub yacht_id: Uuid,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[schema(value_type = String)]
    pub user_role: UserRole,
    #[serde(default)]
    #[schema(value_type = String)]
    pub surface_state: SurfaceState,
    #[serde(default)]
    #[validate(length(max = 512))]
    pub query_text: String,
    #[serde(default)]
    pub entities: Vec<EntityParam>,
    #[serde(default)]
    pub open_entity_id: Option<Uuid>,
    #[serde(default)]
    pub open_thread_id: Option<Uuid>,
    #[serde(default)]
    pub debug_mode: bool,
}

/// One ranked result row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultRowDto {
    pub object_type: String,
    pub object_id: String,
    pub source_table: String,
    #[schema(value_type = Object)]
    pub payload: Value,
    pub rank_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct SearchStats {
    pub waves_executed: usize,
    pub tiers_executed: usize,
    pub early_exit: bool,
    pub deadline_exceeded: bool,
    pub total_time_ms: u64,
    pub tables_hit: Vec<String>,
    pub sql_queries_executed: usize,
    pub vector_queries_executed: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchResponse {
    #[schema(value_type = String)]
    pub lane: Lane,
    #[schema(value_type = String)]
    pub intent: Intent,
    pub rows: Vec<ResultRowDto>,
    pub stats: SearchStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Full plan and per-wave trace; only populated in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub trace: Option<Value>,
}
