//! The linking ladder.
//!
//! Deterministic five-level matcher run on each new inbound email thread.
//! L1 runs first; L2.5 and L3 run concurrently and the higher-scoring
//! candidate wins; L4 is the vendor fallback; L5 either records a
//! procurement-intent stub or emits nothing.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::LinkingConfig;
use crate::models::{
    InboundEmailRequest, LinkAction, LinkConfidence, LinkDecisionRecord, LinkDecisionRequest,
    LinkSuggestionRecord, SuggestedReason,
};
use crate::services::database::SearchDatabase;
use crate::services::embedding::EmbeddingClient;
use crate::utils::{ApiError, ApiResult};

use super::affinity::VendorAffinityCache;
use super::candidates::CandidateFinder;
use super::score::{LinkCandidate, ScoringEngine, thresholds};
use super::token_extractor::{ExtractedTokens, TokenExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderLevel {
    L1,
    L2,
    L25,
    L3,
    L4,
    L5,
}

impl LadderLevel {
    pub fn label(self) -> &'static str {
        match self {
            LadderLevel::L1 => "L1",
            LadderLevel::L2 => "L2",
            LadderLevel::L25 => "L2.5",
            LadderLevel::L3 => "L3",
            LadderLevel::L4 => "L4",
            LadderLevel::L5 => "L5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderAction {
    AutoLink,
    Suggest,
    WeakSuggest,
    ProcurementIntent,
    NoMatch,
}

impl LadderAction {
    pub fn label(self) -> &'static str {
        match self {
            LadderAction::AutoLink => "auto_link",
            LadderAction::Suggest => "suggest",
            LadderAction::WeakSuggest => "weak_suggest",
            LadderAction::ProcurementIntent => "procurement_intent",
            LadderAction::NoMatch => "no_match",
        }
    }
}

pub struct LadderOutcome {
    pub level: LadderLevel,
    pub confidence: LinkConfidence,
    pub action: LadderAction,
    pub primary: Option<LinkCandidate>,
    pub alternates: Vec<LinkCandidate>,
    pub vendor_domain: Option<String>,
}

pub struct LinkingLadder {
    db: Arc<dyn SearchDatabase>,
    finder: CandidateFinder,
    scoring: ScoringEngine,
    extractor: TokenExtractor,
    embedder: Arc<dyn EmbeddingClient>,
    affinity: Arc<VendorAffinityCache>,
    config: LinkingConfig,
}

impl LinkingLadder {
    pub fn new(
        db: Arc<dyn SearchDatabase>,
        finder: CandidateFinder,
        embedder: Arc<dyn EmbeddingClient>,
        affinity: Arc<VendorAffinityCache>,
        config: LinkingConfig,
    ) -> Self {
        Self {
            db,
            finder,
            scoring: ScoringEngine::new(config.clone()),
            extractor: TokenExtractor::new(config.personal_email_domains.clone()),
            embedder,
            affinity,
            config,
        }
    }

    /// Run the ladder for one inbound thread and select the primary object.
    ///
    /// L1 first (deterministic), then L2, then L2.5 and L3 together with the
    /// best score winning. First-wins ordering below that.
    pub async fn determine_primary(
        &self,
        request: &InboundEmailRequest,
    ) -> ApiResult<LadderOutcome> {
        let tokens = self.extractor.extract_all(
            &request.subject,
            &request.from_address,
            &request.attachments,
            &request.participant_hashes,
        );

        if let Err(e) = self
            .db
            .save_thread_tokens(
                request.yacht_id,
                request.thread_id,
                &serde_json::to_value(&tokens).unwrap_or(json!({})),
            )
            .await
        {
            tracing::warn!(thread = %request.thread_id, "failed to save extracted tokens: {e}");
        }

        let affinity_bonuses = match &tokens.vendor {
            Some(vendor) if !vendor.is_personal_domain => {
                self.affinity
                    .bonuses_for(&self.db, request.yacht_id, &vendor.sender_hash)
                    .await
            },
            _ => Default::default(),
        };
        let affinity_fn =
            |object_type: &str| affinity_bonuses.get(object_type).copied().unwrap_or(0);
        let vendor_domain = tokens.vendor.as_ref().map(|v| v.sender_domain.clone());
        let now = Utc::now();

        // L1: explicit ids auto-confirm.
        let l1 = self.finder.find_by_explicit_ids(request.yacht_id, &tokens).await;
        if !l1.is_empty() {
            let scored = self.scoring.score_candidates(l1, affinity_fn, now);
            if self.scoring.should_auto_confirm(&scored[0]) {
                tracing::info!(
                    thread = %request.thread_id,
                    label = %scored[0].label,
                    "L1 match"
                );
                return Ok(outcome(
                    LadderLevel::L1,
                    LinkConfidence::Deterministic,
                    LadderAction::AutoLink,
                    scored,
                    self.config.max_alternates,
                    vendor_domain,
                ));
            }
        }

        // L2: strong procurement signals.
        if tokens.has_procurement_signal() {
            let l2 = self.finder.find_procurement(request.yacht_id, &tokens).await;
            if !l2.is_empty() {
                let scored = self.scoring.score_candidates(l2, affinity_fn, now);
                if self.scoring.is_strong_suggestion(scored[0].score) {
                    tracing::info!(
                        thread = %request.thread_id,
                        label = %scored[0].label,
                        "L2 match"
                    );
                    return Ok(outcome(
                        LadderLevel::L2,
                        LinkConfidence::Suggested,
                        LadderAction::Suggest,
                        scored,
                        self.config.max_alternates,
                        vendor_domain,
                    ));
                }
            }
        }

        // L2.5 and L3 run concurrently; the higher score wins, with the
        // ambiguity flag set when they land within the gap threshold.
        let role = request.user_role.map(|r| r.as_str().to_string());
        let (l25, l3) = tokio::join!(
            self.run_hybrid(request, &tokens, role),
            self.run_parts_equipment(request.yacht_id, &tokens),
        );
        let l25_scored = self.scoring.score_candidates(l25, affinity_fn, now);
        let l3_scored = self.scoring.score_candidates(l3, affinity_fn, now);

        if let Some(selected) = self.choose_mid_ladder(request, l25_scored, l3_scored) {
            return Ok(selected_with_domain(selected, vendor_domain));
        }

        // L4: vendor fallback on open work orders; personal domains excluded.
        if let Some(vendor) = tokens.vendor.as_ref().filter(|v| !v.is_personal_domain) {
            let l4 = self.finder.find_vendor_open_work_orders(request.yacht_id, vendor).await;
            if !l4.is_empty() {
                let scored = self.scoring.score_candidates(l4, affinity_fn, now);
                if self.scoring.should_suggest(scored[0].score) {
                    tracing::info!(
                        thread = %request.thread_id,
                        label = %scored[0].label,
                        "L4 match"
                    );
                    return Ok(outcome(
                        LadderLevel::L4,
                        LinkConfidence::Suggested,
                        LadderAction::WeakSuggest,
                        scored,
                        self.config.max_alternates,
                        vendor_domain,
                    ));
                }
            }
        }

        // L5: procurement-intent stub or nothing.
        let stub = tokens.has_procurement_signal()
            && tokens.vendor.as_ref().is_some_and(|v| !v.is_personal_domain);
        tracing::info!(thread = %request.thread_id, stub, "L5 - no primary match");
        Ok(LadderOutcome {
            level: LadderLevel::L5,
            confidence: LinkConfidence::None,
            action: if stub { LadderAction::ProcurementIntent } else { LadderAction::NoMatch },
            primary: None,
            alternates: Vec::new(),
            vendor_domain,
        })
    }

    async fn run_hybrid(
        &self,
        request: &InboundEmailRequest,
        tokens: &ExtractedTokens,
        role: Option<String>,
    ) -> Vec<LinkCandidate> {
        let query_text = hybrid_query_text(&request.subject, tokens);
        let embedding = self.embedder.embed(&query_text).await;
        if embedding.is_none() {
            tracing::debug!(thread = %request.thread_id, "no embedding; text-only hybrid");
        }
        self.finder
            .find_link_targets(request.yacht_id, &query_text, embedding, role)
            .await
    }

    async fn run_parts_equipment(
        &self,
        yacht_id: Uuid,
        tokens: &ExtractedTokens,
    ) -> Vec<LinkCandidate> {
        let mut candidates = self.finder.find_parts_equipment(yacht_id, tokens).await;

        // An equipment hit pulls in its open work orders as extra targets.
        let equipment_ids: Vec<Uuid> = candidates
            .iter()
            .filter(|c| c.object_type == "equipment")
            .map(|c| c.object_id)
            .collect();
        for equipment_id in equipment_ids {
            candidates
                .extend(self.finder.find_open_work_orders_by_equipment(yacht_id, equipment_id).await);
        }
        candidates
    }

    /// Pick between the L2.5 and L3 winners by score.
    fn choose_mid_ladder(
        &self,
        request: &InboundEmailRequest,
        mut l25: Vec<LinkCandidate>,
        l3: Vec<LinkCandidate>,
    ) -> Option<LadderOutcome> {
        let top25 = l25.first().map(|c| c.score).unwrap_or(i32::MIN);
        let top3 = l3.first().map(|c| c.score).unwrap_or(i32::MIN);

        if top25 == i32::MIN && top3 == i32::MIN {
            return None;
        }

        // Cross-level ambiguity: both winners within the gap.
        if top25 != i32::MIN && top3 != i32::MIN && (top25 - top3).abs() < thresholds::AMBIGUOUS_GAP
        {
            if let Some(first) = l25.first_mut() {
                first.ambiguous = true;
            }
            tracing::debug!(
                thread = %request.thread_id,
                l25 = top25,
                l3 = top3,
                "ambiguous between L2.5 and L3"
            );
        }

        if top25 >= top3 {
            let winner = &l25[0];
            if self.scoring.should_auto_confirm(winner) {
                tracing::info!(thread = %request.thread_id, label = %winner.label, "L2.5 auto-confirm");
                return Some(outcome(
                    LadderLevel::L25,
                    LinkConfidence::Deterministic,
                    LadderAction::AutoLink,
                    l25,
                    self.config.max_alternates,
                    None,
                ));
            }
            if self.scoring.should_suggest(winner.score) {
                tracing::info!(thread = %request.thread_id, label = %winner.label, "L2.5 suggest");
                return Some(outcome(
                    LadderLevel::L25,
                    LinkConfidence::Suggested,
                    LadderAction::Suggest,
                    l25,
                    self.config.max_alternates,
                    None,
                ));
            }
            return None;
        }

        let winner = &l3[0];
        if self.scoring.should_suggest(winner.score) {
            tracing::info!(thread = %request.thread_id, label = %winner.label, "L3 suggest");
            return Some(outcome(
                LadderLevel::L3,
                LinkConfidence::Suggested,
                LadderAction::Suggest,
                l3,
                self.config.max_alternates,
                None,
            ));
        }
        None
    }

    /// Persist the outcome: one primary row plus up to N alternates, each
    /// with its score breakdown. Returns created row ids.
    pub async fn persist_suggestions(
        &self,
        request: &InboundEmailRequest,
        outcome: &LadderOutcome,
    ) -> ApiResult<Vec<Uuid>> {
        let mut created = Vec::new();

        if outcome.action == LadderAction::NoMatch {
            return Ok(created);
        }

        if outcome.action == LadderAction::ProcurementIntent {
            // Stub row marking vendor procurement interest with no target.
            let record = LinkSuggestionRecord {
                yacht_id: request.yacht_id,
                thread_id: request.thread_id,
                object_type: "procurement_intent".to_string(),
                object_id: request.thread_id,
                confidence: LinkConfidence::None,
                is_primary: false,
                score: 0,
                score_breakdown: json!({
                    "base_reason": "procurement_intent",
                    "vendor_domain": outcome.vendor_domain,
                }),
                suggested_reason: SuggestedReason::VendorDomain,
                is_active: false,
            };
            created.push(self.insert(&record).await?);
            return Ok(created);
        }

        let Some(primary) = &outcome.primary else {
            return Ok(created);
        };

        let record = LinkSuggestionRecord {
            yacht_id: request.yacht_id,
            thread_id: request.thread_id,
            object_type: primary.object_type.clone(),
            object_id: primary.object_id,
            confidence: outcome.confidence,
            is_primary: true,
            score: primary.score,
            score_breakdown: primary.breakdown(self.scoring.config()),
            suggested_reason: primary.reason.suggested_reason(),
            is_active: outcome.confidence == LinkConfidence::Deterministic,
        };
        created.push(self.insert(&record).await?);

        for alternate in outcome.alternates.iter().take(self.config.max_alternates) {
            let record = LinkSuggestionRecord {
                yacht_id: request.yacht_id,
                thread_id: request.thread_id,
                object_type: alternate.object_type.clone(),
                object_id: alternate.object_id,
                confidence: LinkConfidence::Suggested,
                is_primary: false,
                score: alternate.score,
                score_breakdown: alternate.breakdown(self.scoring.config()),
                suggested_reason: alternate.reason.suggested_reason(),
                is_active: false,
            };
            created.push(self.insert(&record).await?);
        }

        Ok(created)
    }

    async fn insert(&self, record: &LinkSuggestionRecord) -> ApiResult<Uuid> {
        self.db
            .insert_link_suggestion(record)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))
    }

    /// Record a user decision, retire the superseded primary, and feed the
    /// affinity cache.
    pub async fn record_decision(&self, request: &LinkDecisionRequest) -> ApiResult<Uuid> {
        let prior = self
            .db
            .get_primary_suggestion(request.yacht_id, request.thread_id)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        if matches!(request.action, LinkAction::Change | LinkAction::Unlink) {
            self.db
                .supersede_primary(request.yacht_id, request.thread_id)
                .await
                .map_err(|e| ApiError::Database(e.to_string()))?;
        }

        let vendor_hash = self
            .db
            .get_thread_vendor_hash(request.yacht_id, request.thread_id)
            .await
            .unwrap_or_default();

        let record = LinkDecisionRecord {
            yacht_id: request.yacht_id,
            thread_id: request.thread_id,
            action: request.action,
            object_type: request.object_type.clone(),
            object_id: request.object_id,
            prior_object_type: prior.as_ref().map(|(t, _, _)| t.clone()),
            prior_object_id: prior.as_ref().map(|(_, id, _)| *id),
            prior_score: prior.as_ref().map(|(_, _, s)| *s),
            vendor_hash: vendor_hash.clone(),
        };

        let id = self
            .db
            .insert_link_decision(&record)
            .await
            .map_err(|e| ApiError::Database(e.to_string()))?;

        if let Some(hash) = vendor_hash {
            match (request.action, &request.object_type) {
                (LinkAction::Accept | LinkAction::Change, Some(object_type)) => {
                    self.affinity.record_accept(&hash, object_type);
                },
                (LinkAction::Reject | LinkAction::Unlink, _) => {
                    self.affinity.invalidate(&hash);
                },
                _ => {},
            }
        }

        Ok(id)
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }
}

fn outcome(
    level: LadderLevel,
    confidence: LinkConfidence,
    action: LadderAction,
    mut scored: Vec<LinkCandidate>,
    max_alternates: usize,
    vendor_domain: Option<String>,
) -> LadderOutcome {
    let primary = Some(scored.remove(0));
    scored.truncate(max_alternates);
    LadderOutcome { level, confidence, action, primary, alternates: scored, vendor_domain }
}

fn selected_with_domain(mut selected: LadderOutcome, vendor_domain: Option<String>) -> LadderOutcome {
    selected.vendor_domain = vendor_domain;
    selected
}

/// Subject plus the strongest token values, capped to keep the embedding
/// input small.
fn hybrid_query_text(subject: &str, tokens: &ExtractedTokens) -> String {
    let mut parts = vec![subject.to_string()];
    for values in tokens.ids.values() {
        parts.push(values.join(" "));
    }
    for values in tokens.parts.values() {
        parts.push(values.iter().take(3).cloned().collect::<Vec<_>>().join(" "));
    }
    let joined = parts.join(" ");
    joined.chars().take(500).collect()
}
