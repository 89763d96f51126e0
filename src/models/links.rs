//! Link suggestion / decision records and the inbound-email surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::services::search::scope::UserRole;

/// Confidence attached to a link suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkConfidence {
    Deterministic,
    Suggested,
    None,
}

/// Persisted reason vocabulary for suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedReason {
    WoPattern,
    PoPattern,
    PartNumber,
    SerialMatch,
    VendorDomain,
    TokenMatch,
}

impl SuggestedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestedReason::WoPattern => "wo_pattern",
            SuggestedReason::PoPattern => "po_pattern",
            SuggestedReason::PartNumber => "part_number",
            SuggestedReason::SerialMatch => "serial_match",
            SuggestedReason::VendorDomain => "vendor_domain",
            SuggestedReason::TokenMatch => "token_match",
        }
    }
}

impl LinkConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkConfidence::Deterministic => "deterministic",
            LinkConfidence::Suggested => "suggested",
            LinkConfidence::None => "none",
        }
    }
}

/// User actions on a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkAction {
    Accept,
    Reject,
    Change,
    Unlink,
}

impl LinkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkAction::Accept => "accept",
            LinkAction::Reject => "reject",
            LinkAction::Change => "change",
            LinkAction::Unlink => "unlink",
        }
    }
}

/// Row persisted per suggestion. At most one `is_primary = true` per thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestionRecord {
    pub yacht_id: Uuid,
    pub thread_id: Uuid,
    pub object_type: String,
    pub object_id: Uuid,
    pub confidence: LinkConfidence,
    pub is_primary: bool,
    pub score: i32,
    pub score_breakdown: Value,
    pub suggested_reason: SuggestedReason,
    pub is_active: bool,
}

/// Row persisted per user decision, keeping the prior suggestion for
/// affinity learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDecisionRecord {
    pub yacht_id: Uuid,
    pub thread_id: Uuid,
    pub action: LinkAction,
    pub object_type: Option<String>,
    pub object_id: Option<Uuid>,
    pub prior_object_type: Option<String>,
    pub prior_object_id: Option<Uuid>,
    pub prior_score: Option<i32>,
    pub vendor_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AttachmentMeta {
    pub name: String,
    #[serde(default)]
    pub size_bytes: Option<i64>,
}

/// Inbound email thread offered to the linking ladder.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct InboundEmailRequest {
    #[schema(value_type = String)]
    pub yacht_id: Uuid,
    #[schema(value_type = String)]
    pub thread_id: Uuid,
    #[validate(length(min = 1, max = 1024))]
    pub subject: String,
    #[validate(length(min = 3, max = 320))]
    pub from_address: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    #[serde(default)]
    pub participant_hashes: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub user_role: Option<UserRole>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LinkSuggestionDto {
    #[schema(value_type = String)]
    pub thread_id: Uuid,
    pub object_type: String,
    #[schema(value_type = String)]
    pub object_id: Uuid,
    pub label: String,
    #[schema(value_type = String)]
    pub confidence: LinkConfidence,
    pub is_primary: bool,
    pub score: i32,
    #[schema(value_type = Object)]
    pub score_breakdown: Value,
    #[schema(value_type = String)]
    pub suggested_reason: SuggestedReason,
    pub ambiguous: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LadderResponse {
    pub level: String,
    pub action: String,
    pub primary: Option<LinkSuggestionDto>,
    pub alternates: Vec<LinkSuggestionDto>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LinkDecisionRequest {
    #[schema(value_type = String)]
    pub yacht_id: Uuid,
    #[schema(value_type = String)]
    pub thread_id: Uuid,
    #[schema(value_type = String)]
    pub action: LinkAction,
    pub object_type: Option<String>,
    #[schema(value_type = Option<String>)]
    pub object_id: Option<Uuid>,
}

/// Timestamped view of a stored suggestion, for the thread panel.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoredLinkDto {
    #[schema(value_type = String)]
    pub id: Uuid,
    pub object_type: String,
    #[schema(value_type = String)]
    pub object_id: Uuid,
    #[schema(value_type = String)]
    pub confidence: LinkConfidence,
    pub is_primary: bool,
    pub is_active: bool,
    pub score: i32,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
}
