//! Rule-based intent detection.
//!
//! Intent never changes what can be queried; it only biases table ranking
//! and supplies routing hints. Precedence: DIAGNOSE > ORDER > LOOKUP > SEARCH.

use serde::{Deserialize, Serialize};

use super::capability::{EntityType, Strength};
use super::planner::ExpandedTerm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Diagnose,
    Order,
    Lookup,
    Search,
}

const DIAGNOSE_KEYWORDS: &[&str] =
    &["diagnose", "fault", "error code", "troubleshoot", "alarm", "failure"];

const ORDER_KEYWORDS: &[&str] =
    &["order", "purchase", "requisition", "restock", "buy", "quote"];

const ACTION_VERBS: &[&str] = &[
    "show", "find", "search", "get", "list", "view", "create", "add", "new", "update", "edit",
    "delete", "remove", "diagnose", "troubleshoot", "fix", "link", "order", "purchase",
];

/// Detect intent from the query text and expanded terms.
pub fn detect(query: &str, terms: &[ExpandedTerm]) -> Intent {
    let lowered = query.to_lowercase();

    let has_fault_entity = terms.iter().any(|t| t.entity_type == EntityType::FaultCode);
    if has_fault_entity || DIAGNOSE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Intent::Diagnose;
    }

    if ORDER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Intent::Order;
    }

    let has_strong = terms.iter().any(|t| t.strength == Strength::Strong);
    let has_action_verb = lowered
        .split_whitespace()
        .any(|w| ACTION_VERBS.contains(&w.trim_matches(|c: char| !c.is_alphanumeric())));
    if has_strong && !has_action_verb {
        return Intent::Lookup;
    }

    Intent::Search
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(et: EntityType, value: &str) -> ExpandedTerm {
        ExpandedTerm::new(et, value, 1.0)
    }

    #[test]
    fn fault_entity_wins_precedence() {
        let terms = vec![term(EntityType::FaultCode, "E047")];
        assert_eq!(detect("E047 order part", &terms), Intent::Diagnose);
    }

    #[test]
    fn order_keyword() {
        assert_eq!(detect("order fuel filter", &[]), Intent::Order);
    }

    #[test]
    fn bare_strong_id_is_lookup() {
        let terms = vec![term(EntityType::PartNumber, "ENG-0008-103")];
        assert_eq!(detect("ENG-0008-103", &terms), Intent::Lookup);
    }

    #[test]
    fn strong_id_with_action_verb_is_search() {
        let terms = vec![term(EntityType::PartNumber, "ENG-0008-103")];
        assert_eq!(detect("find ENG-0008-103", &terms), Intent::Search);
    }

    #[test]
    fn default_is_search() {
        let terms = vec![term(EntityType::EquipmentName, "Generator 1")];
        assert_eq!(detect("Generator 1", &terms), Intent::Search);
    }
}
