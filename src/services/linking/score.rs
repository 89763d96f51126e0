//! Point-based candidate scoring for link suggestions.
//!
//! Base scores come from the match reason; recency, open-state and learned
//! vendor-affinity bonuses stack on top. Thresholds decide auto-confirm vs
//! suggestion tiers, with an ambiguity flag when the top two candidates sit
//! within ten points of each other.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::LinkingConfig;
use crate::models::SuggestedReason;

use super::fusion::{self, FusionInputs};

/// Internal match reasons. Each maps to a base score and to the persisted
/// `suggested_reason` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    WoIdMatch,
    PoIdMatch,
    EqIdMatch,
    FaultIdMatch,
    UuidMatch,
    QuoteIdMatch,
    InvoiceIdMatch,
    PartNumberMatch,
    SerialMatch,
    OemNumberMatch,
    VendorEmailMatch,
    VendorHashMatch,
    VendorDomainMatch,
    EquipmentWoLink,
    HybridSearchIndex,
}

impl MatchReason {
    pub fn base_score(self) -> i32 {
        match self {
            // Hard signals, safe to auto-confirm.
            MatchReason::WoIdMatch
            | MatchReason::PoIdMatch
            | MatchReason::EqIdMatch
            | MatchReason::FaultIdMatch
            | MatchReason::UuidMatch => 135,
            // Procurement signals.
            MatchReason::QuoteIdMatch | MatchReason::InvoiceIdMatch => 90,
            // Part / serial signals.
            MatchReason::PartNumberMatch | MatchReason::SerialMatch => 70,
            MatchReason::OemNumberMatch => 60,
            // Vendor context.
            MatchReason::VendorEmailMatch | MatchReason::VendorHashMatch => 45,
            MatchReason::VendorDomainMatch => 30,
            MatchReason::EquipmentWoLink => 35,
            // Computed from fusion inputs, not a constant.
            MatchReason::HybridSearchIndex => 0,
        }
    }

    pub fn suggested_reason(self) -> SuggestedReason {
        match self {
            MatchReason::WoIdMatch | MatchReason::UuidMatch => SuggestedReason::WoPattern,
            MatchReason::PoIdMatch
            | MatchReason::QuoteIdMatch
            | MatchReason::InvoiceIdMatch => SuggestedReason::PoPattern,
            MatchReason::PartNumberMatch | MatchReason::OemNumberMatch => {
                SuggestedReason::PartNumber
            },
            MatchReason::SerialMatch => SuggestedReason::SerialMatch,
            MatchReason::VendorEmailMatch
            | MatchReason::VendorHashMatch
            | MatchReason::VendorDomainMatch => SuggestedReason::VendorDomain,
            MatchReason::EqIdMatch
            | MatchReason::FaultIdMatch
            | MatchReason::EquipmentWoLink
            | MatchReason::HybridSearchIndex => SuggestedReason::TokenMatch,
        }
    }
}

/// Decision thresholds on the 0..150 point scale.
pub mod thresholds {
    pub const AUTO_CONFIRM: i32 = 130;
    pub const STRONG_SUGGEST: i32 = 100;
    pub const WEAK_SUGGEST: i32 = 60;
    /// Top-1 vs top-2 gap below which the result is ambiguous.
    pub const AMBIGUOUS_GAP: i32 = 10;
}

/// Bonus points.
const UPDATED_7D_BONUS: i32 = 15;
const OPEN_STATE_BONUS: i32 = 20;
pub const VENDOR_AFFINITY_CAP: i32 = 15;

/// A link candidate before persistence.
#[derive(Debug, Clone)]
pub struct LinkCandidate {
    pub object_type: String,
    pub object_id: Uuid,
    pub label: String,
    pub reason: MatchReason,
    pub score: i32,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_open: bool,
    pub fusion: Option<FusionInputs>,
    pub ambiguous: bool,
    bonuses: Vec<(&'static str, i32)>,
}

impl LinkCandidate {
    pub fn new(object_type: &str, object_id: Uuid, label: &str, reason: MatchReason) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id,
            label: label.to_string(),
            reason,
            score: 0,
            updated_at: None,
            is_open: false,
            fusion: None,
            ambiguous: false,
            bonuses: Vec::new(),
        }
    }

    pub fn with_state(mut self, updated_at: Option<DateTime<Utc>>, is_open: bool) -> Self {
        self.updated_at = updated_at;
        self.is_open = is_open;
        self
    }

    pub fn with_fusion(mut self, inputs: FusionInputs) -> Self {
        self.fusion = Some(inputs);
        self
    }

    /// Score breakdown persisted with the suggestion.
    pub fn breakdown(&self, config: &LinkingConfig) -> Value {
        match self.fusion {
            Some(inputs) => json!({
                "base_reason": self.reason,
                "fusion_score": fusion::fused_score(&inputs, config),
                "inputs": inputs,
                "weights": {
                    "text": config.hybrid_weights.text,
                    "vector": config.hybrid_weights.vector,
                    "recency": config.hybrid_weights.recency,
                    "bias": config.hybrid_weights.bias,
                },
                "bonuses": self.bonuses,
                "total": self.score,
            }),
            None => json!({
                "base_reason": self.reason,
                "base_score": self.reason.base_score(),
                "bonuses": self.bonuses,
                "total": self.score,
            }),
        }
    }
}

pub struct ScoringEngine {
    config: LinkingConfig,
}

impl ScoringEngine {
    pub fn new(config: LinkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LinkingConfig {
        &self.config
    }

    /// Score candidates: base + bonuses, sorted descending, ambiguity flag on
    /// the top pair when the gap is under ten points.
    pub fn score_candidates(
        &self,
        mut candidates: Vec<LinkCandidate>,
        affinity_bonus: impl Fn(&str) -> i32,
        now: DateTime<Utc>,
    ) -> Vec<LinkCandidate> {
        let seven_days_ago = now - Duration::days(7);

        for candidate in &mut candidates {
            // Fusion candidates already price recency into the fused score
            // and stay within the 0..150 scale; flat bonuses apply only to
            // reason-based candidates.
            candidate.score = match candidate.fusion {
                Some(inputs) => fusion::to_points(fusion::fused_score(&inputs, &self.config)),
                None => {
                    let mut score = candidate.reason.base_score();
                    if candidate.updated_at.is_some_and(|ts| ts > seven_days_ago) {
                        score += UPDATED_7D_BONUS;
                        candidate.bonuses.push(("object_updated_7d", UPDATED_7D_BONUS));
                    }
                    if candidate.is_open {
                        score += OPEN_STATE_BONUS;
                        candidate.bonuses.push(("object_is_open", OPEN_STATE_BONUS));
                    }
                    let affinity =
                        affinity_bonus(&candidate.object_type).clamp(0, VENDOR_AFFINITY_CAP);
                    if affinity > 0 {
                        score += affinity;
                        candidate.bonuses.push(("vendor_affinity", affinity));
                    }
                    score
                },
            };
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.object_id.cmp(&b.object_id)));

        if candidates.len() >= 2
            && candidates[0].score - candidates[1].score < thresholds::AMBIGUOUS_GAP
        {
            candidates[0].ambiguous = true;
            candidates[1].ambiguous = true;
        }

        candidates
    }

    pub fn should_auto_confirm(&self, candidate: &LinkCandidate) -> bool {
        candidate.score >= thresholds::AUTO_CONFIRM && !candidate.ambiguous
    }

    pub fn should_suggest(&self, score: i32) -> bool {
        score >= thresholds::WEAK_SUGGEST
    }

    pub fn is_strong_suggestion(&self, score: i32) -> bool {
        score >= thresholds::STRONG_SUGGEST
    }
}
