//! Result merging and ranking.
//!
//! SQL and vector candidate sets merge into one list, deduplicated by
//! `(object_type, object_id)` with insertion order preserved. The first
//! occurrence is authoritative; repeats only boost the score. Recipes are
//! plain weight sets, no learned ranking.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::executor::SourcedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Sql,
    Vector,
}

/// One merge candidate, from either retrieval path.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub object_type: String,
    pub object_id: String,
    pub source_table: String,
    pub source: ResultSource,
    pub similarity: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct RankedRow {
    pub object_type: String,
    pub object_id: String,
    pub source_table: String,
    pub source: ResultSource,
    pub rank_score: f64,
    pub updated_at: Option<DateTime<Utc>>,
    pub payload: Value,
}

/// Named weight set applied by the merger.
#[derive(Debug, Clone, Copy)]
pub struct RankingRecipe {
    pub name: &'static str,
    pub similarity: f64,
    pub recency: f64,
    pub exact_match_boost: f64,
}

const RECIPES: &[RankingRecipe] = &[
    RankingRecipe { name: "global_search", similarity: 0.45, recency: 0.25, exact_match_boost: 0.30 },
    RankingRecipe { name: "email_inbox", similarity: 0.30, recency: 0.55, exact_match_boost: 0.15 },
    RankingRecipe { name: "email_search", similarity: 0.50, recency: 0.30, exact_match_boost: 0.20 },
];

/// Fraction of a repeat sighting's score credited to the first occurrence.
const REPEAT_BOOST: f64 = 0.25;

const RECENCY_HALF_LIFE_DAYS: f64 = 90.0;

pub fn recipe(name: &str) -> &'static RankingRecipe {
    RECIPES.iter().find(|r| r.name == name).unwrap_or(&RECIPES[0])
}

/// Exponential recency decay with a 90-day half-life, clamped to [0, 1].
pub fn recency_score(updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(ts) = updated_at else { return 0.0 };
    let age_days = (now - ts).num_seconds() as f64 / 86_400.0;
    if age_days <= 0.0 {
        return 1.0;
    }
    (0.5f64).powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

/// Timestamp fields recognized on result payloads, most specific first.
const TIMESTAMP_KEYS: &[&str] = &["updated_at", "sent_at", "last_message_at", "reported_at", "created_at"];

pub fn candidate_from_sql(row: SourcedRow) -> Candidate {
    let updated_at = TIMESTAMP_KEYS
        .iter()
        .filter_map(|k| row.data.get(*k))
        .filter_map(|v| v.as_str())
        .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .next();

    Candidate {
        object_type: row.object_type,
        object_id: row.object_id,
        source_table: row.table,
        source: ResultSource::Sql,
        similarity: None,
        updated_at,
        payload: Value::Object(row.data),
    }
}

fn score(candidate: &Candidate, recipe: &RankingRecipe, now: DateTime<Utc>) -> f64 {
    let mut total = 0.0;
    if let Some(similarity) = candidate.similarity {
        total += similarity * recipe.similarity;
    }
    total += recency_score(candidate.updated_at, now) * recipe.recency;
    if candidate.source == ResultSource::Sql {
        total += recipe.exact_match_boost;
    }
    total
}

/// Merge, dedup and rank. Idempotent: feeding the output back in reproduces
/// the same list.
pub fn merge_and_rank(
    candidates: Vec<Candidate>,
    recipe: &RankingRecipe,
    now: DateTime<Utc>,
) -> Vec<RankedRow> {
    let mut rows: Vec<RankedRow> = Vec::new();
    let mut index: std::collections::HashMap<(String, String), usize> =
        std::collections::HashMap::new();

    for candidate in candidates {
        let key = (candidate.object_type.clone(), candidate.object_id.clone());
        let candidate_score = score(&candidate, recipe, now);

        match index.get(&key) {
            Some(&pos) => {
                // First occurrence stays authoritative; repeats only boost.
                rows[pos].rank_score += candidate_score * REPEAT_BOOST;
            },
            None => {
                index.insert(key, rows.len());
                rows.push(RankedRow {
                    object_type: candidate.object_type,
                    object_id: candidate.object_id,
                    source_table: candidate.source_table,
                    source: candidate.source,
                    rank_score: candidate_score,
                    updated_at: candidate.updated_at,
                    payload: candidate.payload,
                });
            },
        }
    }

    // Stable sort: equal keys keep insertion order. Ties break SQL over
    // vector, then newer timestamp.
    rows.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| source_order(a.source).cmp(&source_order(b.source)))
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    rows
}

fn source_order(source: ResultSource) -> u8 {
    match source {
        ResultSource::Sql => 0,
        ResultSource::Vector => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(object_id: &str, source: ResultSource, similarity: Option<f64>) -> Candidate {
        Candidate {
            object_type: "part".to_string(),
            object_id: object_id.to_string(),
            source_table: "pms_parts".to_string(),
            source,
            similarity,
            updated_at: None,
            payload: Value::Null,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let now = Utc::now();
        let rows = merge_and_rank(
            vec![
                candidate("a", ResultSource::Sql, None),
                candidate("a", ResultSource::Vector, Some(0.9)),
                candidate("b", ResultSource::Vector, Some(0.8)),
            ],
            recipe("global_search"),
            now,
        );
        assert_eq!(rows.len(), 2);
        let a = rows.iter().find(|r| r.object_id == "a").unwrap();
        assert_eq!(a.source, ResultSource::Sql);
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let now = Utc::now();
        let input = vec![
            candidate("a", ResultSource::Sql, None),
            candidate("b", ResultSource::Vector, Some(0.7)),
        ];
        let once = merge_and_rank(input.clone(), recipe("global_search"), now);
        let twice_input: Vec<Candidate> = once
            .iter()
            .map(|r| Candidate {
                object_type: r.object_type.clone(),
                object_id: r.object_id.clone(),
                source_table: r.source_table.clone(),
                source: r.source,
                similarity: None,
                updated_at: r.updated_at,
                payload: r.payload.clone(),
            })
            .collect();
        let twice = merge_and_rank(twice_input, recipe("global_search"), now);
        let ids_once: Vec<&str> = once.iter().map(|r| r.object_id.as_str()).collect();
        let ids_twice: Vec<&str> = twice.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids_once, ids_twice);
    }

    #[test]
    fn ranking_is_stable_on_pre_ranked_input() {
        let now = Utc::now();
        let input = vec![
            candidate("a", ResultSource::Sql, None),
            candidate("b", ResultSource::Sql, None),
            candidate("c", ResultSource::Sql, None),
        ];
        let ranked = merge_and_rank(input, recipe("global_search"), now);
        let ids: Vec<&str> = ranked.iter().map(|r| r.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn sql_outranks_vector_on_tied_scores() {
        let now = Utc::now();
        // A vector row whose similarity exactly offsets the SQL boost.
        let r = recipe("global_search");
        let sim = r.exact_match_boost / r.similarity;
        let rows = merge_and_rank(
            vec![
                candidate("v", ResultSource::Vector, Some(sim)),
                candidate("s", ResultSource::Sql, None),
            ],
            r,
            now,
        );
        assert_eq!(rows[0].object_id, "s");
    }

    #[test]
    fn recency_decays_with_half_life() {
        let now = Utc::now();
        let fresh = recency_score(Some(now), now);
        let old = recency_score(Some(now - Duration::days(90)), now);
        let ancient = recency_score(Some(now - Duration::days(360)), now);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!((old - 0.5).abs() < 1e-6);
        assert!(ancient < 0.07);
        assert!(recency_score(None, now) == 0.0);
    }
}
