//! Column matching, conjunction planning and batch planning.
//!
//! PREPARE output lives here: the frozen [`ExecutionPlan`]. Everything is a
//! pure data transformation; no SQL is rendered and nothing suspends.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SearchConfig;

use super::bias::TableScore;
use super::capability::{CapabilityRegistry, EntityType, Strength, TableCapability};
use super::intent::Intent;
use super::lane::{Lane, LaneDecision};
use super::operators::Wave;
use super::scope::UserScope;
use super::surface::SurfaceState;
use super::variants::{self, Variant};

/// A term with its generated variants and bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedTerm {
    pub entity_type: EntityType,
    pub original: String,
    pub strength: Strength,
    pub confidence: f64,
    pub variants: Vec<Variant>,
}

impl ExpandedTerm {
    pub fn new(entity_type: EntityType, original: &str, confidence: f64) -> Self {
        Self {
            entity_type,
            original: original.to_string(),
            strength: entity_type.strength(),
            confidence,
            variants: variants::expand(original),
        }
    }

    /// Terms whose raw value expanded to nothing are dropped upstream.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// One column bound for one term on one table, with the variants the column
/// can actually serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundColumn {
    pub column: String,
    pub json_key: Option<String>,
    pub variants: Vec<Variant>,
}

/// One term bound on one table. Multiple columns mean shape B:
/// `(col_a op $k) OR (col_b op $k)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityBinding {
    pub term_index: usize,
    pub columns: Vec<BoundColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conjunction {
    And,
    Or,
}

/// Per-table resolution: which terms bind to which columns, and how the
/// bindings combine. Two or more bindings form shape C (AND across terms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedQuery {
    pub table: String,
    pub bindings: Vec<EntityBinding>,
    pub conjunction: Conjunction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitCondition {
    pub strong_hit_count: usize,
    pub max_time_ms: u64,
}

/// Tables grouped into one bias tier, with their wave order and exit gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub tier: u8,
    pub tables: Vec<String>,
    pub wave_order: Vec<Wave>,
    pub exit: ExitCondition,
}

/// The frozen output of PREPARE. Owned exclusively by the in-flight request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: String,
    pub lane: LaneDecision,
    pub intent: Intent,
    pub scope: UserScope,
    pub surface: SurfaceState,
    pub terms: Vec<ExpandedTerm>,
    pub ranked_tables: Vec<TableScore>,
    pub resolved: Vec<ResolvedQuery>,
    pub batches: Vec<BatchPlan>,
    /// Every entity was weak: primary text columns only, wave capped at ILIKE.
    pub weak_only: bool,
}

impl ExecutionPlan {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()[..8].to_string()
    }

    pub fn resolved_for(&self, table: &str) -> Option<&ResolvedQuery> {
        self.resolved.iter().find(|r| r.table == table)
    }
}

const TIER1_MIN_BIAS: f64 = 3.0;
const TIER2_MIN_BIAS: f64 = 1.5;

/// Resolve column bindings for every ranked table.
///
/// Gates enforced here:
/// - `conjunction_only` columns contribute only to shape-C probes;
/// - `isolated_ok = false` columns need a strong/medium anchor binding from
///   another term on the same table;
/// - when every term is weak, only primary text columns participate and
///   variants are capped at the ILIKE wave.
pub fn resolve_queries(
    registry: &CapabilityRegistry,
    ranked: &[TableScore],
    terms: &[ExpandedTerm],
) -> (Vec<ResolvedQuery>, bool) {
    let weak_only = !terms.is_empty() && terms.iter().all(|t| t.strength == Strength::Weak);

    let mut resolved = Vec::new();
    for score in ranked {
        let Some(table) = registry.table(&score.table) else { continue };
        if let Some(query) = resolve_table(table, terms, weak_only) {
            resolved.push(query);
        }
    }
    (resolved, weak_only)
}

fn resolve_table(
    table: &TableCapability,
    terms: &[ExpandedTerm],
    weak_only: bool,
) -> Option<ResolvedQuery> {
    // First pass: anchor terms are those with a strong/medium strength bound
    // to an unrestricted column on this table.
    let anchor_terms: Vec<usize> = terms
        .iter()
        .enumerate()
        .filter(|(_, t)| t.strength >= Strength::Medium)
        .filter(|(_, t)| {
            table
                .columns_for(t.entity_type)
                .iter()
                .any(|c| c.isolated_ok && !c.conjunction_only)
        })
        .map(|(i, _)| i)
        .collect();

    let multi_entity = terms.len() >= 2;
    let has_anchor = !anchor_terms.is_empty();

    let mut bindings = Vec::new();
    for (idx, term) in terms.iter().enumerate() {
        if term.is_empty() {
            continue;
        }

        let mut columns = Vec::new();
        for col in table.columns_for(term.entity_type) {
            if weak_only && !col.primary_text {
                continue;
            }
            // Shape-C-only column: needs a second entity and a non-weak anchor.
            if col.conjunction_only && !(multi_entity && has_anchor) {
                continue;
            }
            // Column that cannot stand alone: needs an anchor from another term.
            if !col.isolated_ok && !anchor_terms.iter().any(|a| *a != idx) {
                continue;
            }

            let mut eligible: Vec<Variant> = term
                .variants
                .iter()
                .filter(|v| col.supports(v.operator))
                .cloned()
                .collect();
            if weak_only {
                eligible.retain(|v| v.operator.wave() <= Wave::Ilike);
            }
            if eligible.is_empty() {
                continue;
            }

            columns.push(BoundColumn {
                column: col.name.clone(),
                json_key: col.json_keys.as_ref().and_then(|k| k.first().cloned()),
                variants: eligible,
            });
        }

        if !columns.is_empty() {
            bindings.push(EntityBinding { term_index: idx, columns });
        }
    }

    if bindings.is_empty() {
        return None;
    }

    let conjunction = if bindings.len() >= 2 { Conjunction::And } else { Conjunction::Or };
    Some(ResolvedQuery { table: table.name.clone(), bindings, conjunction })
}

/// Partition ranked tables into bias tiers and attach wave order + exit
/// conditions. NO_LLM restricts every batch to the EXACT wave.
pub fn plan_batches(
    ranked: &[TableScore],
    lane: Lane,
    weak_only: bool,
    config: &SearchConfig,
) -> Vec<BatchPlan> {
    let wave_order: Vec<Wave> = match lane {
        Lane::NoLlm => vec![Wave::Exact],
        _ if weak_only => vec![Wave::Exact, Wave::Ilike],
        _ => vec![Wave::Exact, Wave::Ilike, Wave::Trigram],
    };

    let exit = ExitCondition {
        strong_hit_count: config.strong_hit_count,
        max_time_ms: config.total_budget_ms,
    };

    let mut tiers: [Vec<String>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for score in ranked {
        if score.bias >= TIER1_MIN_BIAS {
            tiers[0].push(score.table.clone());
        } else if score.bias >= TIER2_MIN_BIAS {
            tiers[1].push(score.table.clone());
        } else if score.bias > 0.0 {
            tiers[2].push(score.table.clone());
        }
    }

    tiers
        .into_iter()
        .enumerate()
        .filter(|(_, tables)| !tables.is_empty())
        .map(|(i, tables)| BatchPlan {
            tier: (i + 1) as u8,
            tables,
            wave_order: wave_order.clone(),
            exit,
        })
        .collect()
}
