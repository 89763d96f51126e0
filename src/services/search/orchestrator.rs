//! Search orchestration: PREPARE then EXECUTE.
//!
//! PREPARE is a pure data transformation ending in a frozen `ExecutionPlan`;
//! EXECUTE hands the plan to the probe executor and merges what comes back.
//! Nothing here renders SQL and nothing in PREPARE suspends.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;

use crate::config::Config;
use crate::models::{ResultRowDto, SearchRequest, SearchResponse, SearchStats};
use crate::services::database::SearchDatabase;
use crate::utils::{ApiError, ApiResult, StringExt};

use super::bias;
use super::capability::{CapabilityRegistry, EntityType};
use super::executor::ProbeExecutor;
use super::intent;
use super::lane::{self, Lane};
use super::planner::{self, ExecutionPlan, ExpandedTerm};
use super::ranker;
use super::scope::UserScope;
use super::surface::SurfaceState;

pub struct SearchService {
    db: Arc<dyn SearchDatabase>,
    registry: &'static CapabilityRegistry,
    config: Config,
}

impl SearchService {
    pub fn new(db: Arc<dyn SearchDatabase>, config: Config) -> Self {
        let registry = CapabilityRegistry::builtin();
        let gaps = registry.verify_entity_coverage();
        if !gaps.is_empty() {
            tracing::warn!("entity types without isolated routing: {gaps:?}");
        }
        for table in registry.tables() {
            if table.yacht_id_column != config.search.tenant_column_name {
                tracing::warn!(
                    "table {} isolates on {}, configured tenant column is {}",
                    table.name,
                    table.yacht_id_column,
                    config.search.tenant_column_name
                );
            }
        }
        Self { db, registry, config }
    }

    /// PREPARE. Pure: same inputs, same plan; no side effects.
    pub fn prepare(
        &self,
        query_text: &str,
        entities: &[(EntityType, String, f64)],
        scope: UserScope,
        surface: SurfaceState,
    ) -> ExecutionPlan {
        let terms = build_terms(query_text, entities);
        let lane_decision = lane::classify(query_text, &terms);
        let detected_intent = intent::detect(query_text, &terms);

        if matches!(lane_decision.lane, Lane::Blocked | Lane::Unknown) {
            return ExecutionPlan {
                plan_id: ExecutionPlan::new_id(),
                lane: lane_decision,
                intent: detected_intent,
                scope,
                surface,
                terms,
                ranked_tables: Vec::new(),
                resolved: Vec::new(),
                batches: Vec::new(),
                weak_only: false,
            };
        }

        let allowed = surface.default_scopes();
        let ranked = bias::rank_tables(self.registry, &terms, detected_intent, &scope, allowed);
        let (resolved, weak_only) = planner::resolve_queries(self.registry, &ranked, &terms);
        let batches =
            planner::plan_batches(&ranked, lane_decision.lane, weak_only, &self.config.search);

        ExecutionPlan {
            plan_id: ExecutionPlan::new_id(),
            lane: lane_decision,
            intent: detected_intent,
            scope,
            surface,
            terms,
            ranked_tables: ranked,
            resolved,
            batches,
            weak_only,
        }
    }

    /// Full request path: validate, prepare, execute, rank, respond.
    pub async fn search(&self, request: SearchRequest) -> ApiResult<SearchResponse> {
        let started = Instant::now();

        if request.yacht_id.is_nil() {
            return Err(ApiError::validation_error("yacht_id must be a valid tenant id"));
        }
        if request.query_text.trim().is_empty() && request.entities.is_empty() {
            return Err(ApiError::validation_error(
                "query_text and entities cannot both be empty",
            ));
        }

        // Scope is re-derived server-side; the body only names role claims.
        let scope = UserScope::resolve(request.yacht_id, &request.user_id, request.user_role);

        let entities: Vec<(EntityType, String, f64)> = request
            .entities
            .iter()
            .map(|e| (e.entity_type, e.value.clone(), e.confidence))
            .collect();

        let plan =
            self.prepare(&request.query_text, &entities, scope, request.surface_state);

        tracing::info!(
            plan_id = %plan.plan_id,
            lane = ?plan.lane.lane,
            intent = ?plan.intent,
            terms = plan.terms.len(),
            tables = plan.ranked_tables.len(),
            "plan prepared"
        );

        match plan.lane.lane {
            Lane::Blocked => {
                return Ok(terminal_response(&plan, started, request.debug_mode));
            },
            Lane::Unknown => {
                return Ok(terminal_response(&plan, started, request.debug_mode));
            },
            _ => {},
        }

        let executor = ProbeExecutor::new(
            Arc::clone(&self.db),
            self.registry,
            self.config.search.clone(),
        );
        let outcome = executor.execute(&plan).await?;

        let now = Utc::now();
        let recipe = ranker::recipe(plan.surface.recipe_name());
        let candidates = outcome.rows.iter().cloned().map(ranker::candidate_from_sql).collect();
        let ranked = ranker::merge_and_rank(candidates, recipe, now);

        let rows: Vec<ResultRowDto> = ranked
            .into_iter()
            .take(self.config.search.global_limit as usize)
            .map(|r| ResultRowDto {
                object_type: r.object_type,
                object_id: r.object_id,
                source_table: r.source_table,
                payload: r.payload,
                rank_score: r.rank_score,
            })
            .collect();

        let stats = SearchStats {
            waves_executed: outcome.waves_executed,
            tiers_executed: outcome.tiers_executed,
            early_exit: outcome.early_exit,
            deadline_exceeded: outcome.deadline_exceeded,
            total_time_ms: started.elapsed().as_millis() as u64,
            tables_hit: outcome.tables_hit.clone(),
            sql_queries_executed: outcome.sql_queries_executed,
            vector_queries_executed: 0,
        };

        let trace = request.debug_mode.then(|| {
            json!({
                "prepare": plan_trace(&plan),
                "execute": {
                    "waves": outcome.wave_traces,
                    "probes": outcome.probe_traces,
                },
            })
        });

        Ok(SearchResponse {
            lane: plan.lane.lane,
            intent: plan.intent,
            rows,
            stats,
            block_message: None,
            suggestions: Vec::new(),
            trace,
        })
    }
}

/// Expand request entities into terms; a bare query with no entities becomes
/// one weak free-text term so the degraded path still searches something.
fn build_terms(query_text: &str, entities: &[(EntityType, String, f64)]) -> Vec<ExpandedTerm> {
    let mut terms: Vec<ExpandedTerm> = entities
        .iter()
        .map(|(et, value, confidence)| ExpandedTerm::new(*et, value, *confidence))
        .filter(|t| !t.is_empty())
        .collect();

    if terms.is_empty()
        && let Some(query) = query_text.clean()
    {
        let term = ExpandedTerm::new(EntityType::FreeText, &query, 0.5);
        if !term.is_empty() {
            terms.push(term);
        }
    }
    terms
}

/// Zero-row response for BLOCKED and UNKNOWN lanes. Never rendered as an
/// error: lane, reason and suggestions explain the outcome.
fn terminal_response(plan: &ExecutionPlan, started: Instant, debug: bool) -> SearchResponse {
    SearchResponse {
        lane: plan.lane.lane,
        intent: plan.intent,
        rows: Vec::new(),
        stats: SearchStats {
            total_time_ms: started.elapsed().as_millis() as u64,
            ..SearchStats::default()
        },
        block_message: plan.lane.block_message.clone(),
        suggestions: plan.lane.suggestions.clone(),
        trace: debug.then(|| json!({ "prepare": plan_trace(plan) })),
    }
}

fn plan_trace(plan: &ExecutionPlan) -> serde_json::Value {
    json!({
        "plan_id": plan.plan_id,
        "lane": plan.lane,
        "intent": plan.intent,
        "weak_only": plan.weak_only,
        "terms": plan.terms.iter().map(|t| json!({
            "type": t.entity_type,
            "value": t.original,
            "strength": t.strength,
            "variants": t.variants.len(),
        })).collect::<Vec<_>>(),
        "tables_ranked": plan.ranked_tables.iter().take(5).map(|s| json!({
            "table": s.table,
            "bias": s.bias,
        })).collect::<Vec<_>>(),
        "batches": plan.batches.iter().map(|b| json!({
            "tier": b.tier,
            "tables": b.tables,
            "waves": b.wave_order,
        })).collect::<Vec<_>>(),
    })
}
