//! Table bias scoring.
//!
//! Produces the ranked candidate table list the batch planner tiers. Scores
//! are additive per term; a table the caller's role cannot read is removed
//! outright rather than down-weighted.

use serde::{Deserialize, Serialize};

use super::capability::CapabilityRegistry;
use super::intent::Intent;
use super::planner::ExpandedTerm;
use super::scope::UserScope;

const PRIMARY_HOME_BIAS: f64 = 2.0;
const SECONDARY_BIAS: f64 = 1.0;
const INTENT_AFFINITY_BIAS: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableScore {
    pub table: String,
    pub bias: f64,
}

/// Declared intent → table affinities. One bonus per declared pair.
fn intent_affinities(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Diagnose => &["pms_faults", "search_fault_code_catalog", "symptom_aliases"],
        Intent::Order => &["purchase_orders", "pms_parts", "v_inventory"],
        Intent::Lookup => &["pms_parts", "pms_equipment", "pms_work_orders"],
        Intent::Search => &[],
    }
}

/// Rank candidate tables by bias, descending. Ties break by table name.
pub fn rank_tables(
    registry: &CapabilityRegistry,
    terms: &[ExpandedTerm],
    intent: Intent,
    scope: &UserScope,
    allowed_scopes: &[&str],
) -> Vec<TableScore> {
    let affinities = intent_affinities(intent);

    let mut scored: Vec<TableScore> = Vec::new();
    for table in registry.tables() {
        if !scope.can_read(&table.name) {
            continue;
        }
        if !allowed_scopes.is_empty() && !allowed_scopes.contains(&table.name.as_str()) {
            continue;
        }

        let mut bias = 0.0;
        for term in terms {
            for col in table.columns_for(term.entity_type) {
                bias += if col.primary_home { PRIMARY_HOME_BIAS } else { SECONDARY_BIAS };
            }
        }
        if affinities.contains(&table.name.as_str()) {
            bias += INTENT_AFFINITY_BIAS;
        }

        if bias > 0.0 {
            scored.push(TableScore { table: table.name.clone(), bias });
        }
    }

    scored.sort_by(|a, b| {
        b.bias
            .partial_cmp(&a.bias)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.table.cmp(&b.table))
    });

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search::capability::EntityType;
    use crate::services::search::scope::UserRole;
    use uuid::Uuid;

    fn scope(role: UserRole) -> UserScope {
        UserScope::resolve(Uuid::new_v4(), "u1", role)
    }

    #[test]
    fn primary_home_outranks_secondary() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::PartNumber, "ENG-0008-103", 1.0)];
        let ranked =
            rank_tables(reg, &terms, Intent::Lookup, &scope(UserRole::Engineer), &[]);

        assert_eq!(ranked[0].table, "pms_parts");
        let parts = ranked.iter().find(|s| s.table == "pms_parts").unwrap();
        let inventory = ranked.iter().find(|s| s.table == "v_inventory").unwrap();
        assert!(parts.bias > inventory.bias);
    }

    #[test]
    fn role_gating_removes_tables() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::SupplierName, "Acme Marine", 1.0)];
        let ranked = rank_tables(reg, &terms, Intent::Order, &scope(UserRole::Crew), &[]);
        assert!(!ranked.iter().any(|s| s.table == "purchase_orders"));
    }

    #[test]
    fn intent_affinity_adds_half_point() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::FaultCode, "E047", 1.0)];
        let diagnose =
            rank_tables(reg, &terms, Intent::Diagnose, &scope(UserRole::Engineer), &[]);
        let search = rank_tables(reg, &terms, Intent::Search, &scope(UserRole::Engineer), &[]);

        let d = diagnose.iter().find(|s| s.table == "pms_faults").unwrap();
        let s = search.iter().find(|s| s.table == "pms_faults").unwrap();
        assert!((d.bias - s.bias - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn equipment_query_ranks_equipment_and_graph_in_front() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::EquipmentName, "Generator 1", 1.0)];
        let ranked =
            rank_tables(reg, &terms, Intent::Search, &scope(UserRole::Engineer), &[]);

        let names: Vec<&str> = ranked.iter().map(|s| s.table.as_str()).collect();
        let eq_pos = names.iter().position(|n| *n == "pms_equipment").unwrap();
        let graph_pos = names.iter().position(|n| *n == "graph_nodes").unwrap();
        assert!(eq_pos < 3, "{names:?}");
        assert!(graph_pos < 4, "{names:?}");
    }

    #[test]
    fn equal_bias_ties_break_by_table_name() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::PartName, "fuel filter", 1.0)];
        let ranked = rank_tables(reg, &terms, Intent::Search, &scope(UserRole::Engineer), &[]);

        // graph_nodes and v_inventory both serve PART_NAME as secondary
        // homes; the tie resolves alphabetically.
        let graph = ranked.iter().position(|s| s.table == "graph_nodes").unwrap();
        let inventory = ranked.iter().position(|s| s.table == "v_inventory").unwrap();
        assert!(
            (ranked[graph].bias - ranked[inventory].bias).abs() < f64::EPSILON,
            "fixture assumes a tie"
        );
        assert!(graph < inventory);
    }

    #[test]
    fn scope_filter_limits_candidates() {
        let reg = CapabilityRegistry::builtin();
        let terms = vec![ExpandedTerm::new(EntityType::FreeText, "invoice", 0.4)];
        let ranked = rank_tables(
            reg,
            &terms,
            Intent::Search,
            &scope(UserRole::Engineer),
            &["email_threads"],
        );
        assert!(ranked.iter().all(|s| s.table == "email_threads"));
    }
}
