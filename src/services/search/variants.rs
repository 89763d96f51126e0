//! Variant generation for expanded terms.
//!
//! Each raw term fans out into an ordered sequence of typed variants, every
//! one bound to exactly one operator. Lower priority is tried first.

use serde::{Deserialize, Serialize};

use super::canonical::canonical_identifier;
use super::operators::Operator;
use crate::utils::StringExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantForm {
    Canonical,
    Raw,
    Normalized,
    Fuzzy,
    Trigram,
    Prefix,
}

/// One surface form of a term, bound to its operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub form: VariantForm,
    pub value: String,
    pub operator: Operator,
    pub priority: u8,
}

/// Generate variants for a raw term, sorted by ascending priority.
///
/// The canonical variant keeps structural punctuation (hyphens in part
/// numbers) because the storage layer preserves it. Empty or whitespace-only
/// input produces no variants; the caller drops the entity.
pub fn expand(raw: &str) -> Vec<Variant> {
    let Some(raw) = raw.clean() else {
        return Vec::new();
    };

    let mut variants = vec![
        Variant {
            form: VariantForm::Canonical,
            value: canonical_identifier(&raw),
            operator: Operator::Exact,
            priority: 1,
        },
        Variant {
            form: VariantForm::Raw,
            value: raw.clone(),
            operator: Operator::Exact,
            priority: 2,
        },
        Variant {
            form: VariantForm::Normalized,
            value: raw.to_lowercase(),
            operator: Operator::Exact,
            priority: 3,
        },
        Variant {
            form: VariantForm::Fuzzy,
            value: format!("%{raw}%"),
            operator: Operator::Ilike,
            priority: 4,
        },
    ];

    // Trigram needs at least three characters of signal; wildcards stay out.
    if raw.chars().count() >= 3 {
        variants.push(Variant {
            form: VariantForm::Trigram,
            value: raw.to_lowercase(),
            operator: Operator::Trigram,
            priority: 5,
        });
    }

    // Prefix matching only helps for identifier-shaped terms.
    if raw.looks_like_identifier() {
        variants.push(Variant {
            form: VariantForm::Prefix,
            value: format!("{raw}%"),
            operator: Operator::Ilike,
            priority: 6,
        });
    }

    variants.sort_by_key(|v| v.priority);
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_always_first_and_structure_preserving() {
        let variants = expand("eng-0008-103");
        assert_eq!(variants[0].form, VariantForm::Canonical);
        assert_eq!(variants[0].value, "ENG-0008-103");
        assert_eq!(variants[0].operator, Operator::Exact);
    }

    #[test]
    fn priorities_strictly_increase() {
        let variants = expand("Generator 1");
        for pair in variants.windows(2) {
            assert!(pair[0].priority < pair[1].priority);
        }
    }

    #[test]
    fn fuzzy_wraps_with_wildcards() {
        let variants = expand("fuel filter");
        let fuzzy = variants.iter().find(|v| v.form == VariantForm::Fuzzy).unwrap();
        assert_eq!(fuzzy.value, "%fuel filter%");
        assert_eq!(fuzzy.operator, Operator::Ilike);
    }

    #[test]
    fn trigram_is_lowercased_without_wildcards() {
        let variants = expand("MTU");
        let tri = variants.iter().find(|v| v.form == VariantForm::Trigram).unwrap();
        assert_eq!(tri.value, "mtu");
        assert!(!tri.value.contains('%'));
    }

    #[test]
    fn prefix_only_for_identifiers() {
        assert!(expand("ENG-0008").iter().any(|v| v.form == VariantForm::Prefix));
        assert!(!expand("fuel filter").iter().any(|v| v.form == VariantForm::Prefix));
    }

    #[test]
    fn blank_input_produces_nothing() {
        assert!(expand("").is_empty());
        assert!(expand("   ").is_empty());
    }

    #[test]
    fn short_terms_skip_trigram() {
        assert!(!expand("4c").iter().any(|v| v.form == VariantForm::Trigram));
    }
}
