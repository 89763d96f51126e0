//! Database collaborator.
//!
//! The core consumes a read-mostly SQL surface through [`SearchDatabase`];
//! the Postgres implementation is the only place pool handles live. A
//! collaborator that lacks trigram or vector support reports
//! [`DbError::Unsupported`], which the wave runner treats as a skip.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{LinkDecisionRecord, LinkSuggestionRecord};

use super::search::operators::ParamValue;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The operator (trigram / vector / RPC) is not installed on this
    /// database. Waves downgrade to skipped on this error.
    #[error("unsupported by collaborator: {0}")]
    Unsupported(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Hybrid retrieval request for the `match_link_targets` procedure.
#[derive(Debug, Clone)]
pub struct LinkTargetQuery {
    pub yacht_id: Uuid,
    pub query_text: String,
    pub query_embedding: Option<Vec<f32>>,
    pub object_types: Option<Vec<String>>,
    pub role: Option<String>,
    pub days_back: i32,
    pub limit: i64,
}

/// One fused-retrieval row from the search index.
#[derive(Debug, Clone)]
pub struct LinkTargetRow {
    pub object_type: String,
    pub object_id: Uuid,
    pub label: String,
    pub s_text: f64,
    pub s_vector: f64,
    pub s_recency: f64,
    pub s_bias: f64,
    pub rank_text: i32,
    pub rank_vector: i32,
    pub payload: Value,
}

#[async_trait]
pub trait SearchDatabase: Send + Sync {
    /// Execute a generated statement and return its rows as JSON objects.
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<Vec<serde_json::Map<String, Value>>, DbError>;

    /// Fused hybrid retrieval over the search index.
    async fn match_link_targets(&self, query: &LinkTargetQuery)
    -> Result<Vec<LinkTargetRow>, DbError>;

    async fn insert_link_suggestion(&self, record: &LinkSuggestionRecord)
    -> Result<Uuid, DbError>;

    async fn insert_link_decision(&self, record: &LinkDecisionRecord) -> Result<Uuid, DbError>;

    /// Persist the tokens extracted from a thread's metadata.
    async fn save_thread_tokens(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
        tokens: &Value,
    ) -> Result<(), DbError>;

    /// Retire the previous primary suggestion before a `change` decision.
    async fn supersede_primary(&self, yacht_id: Uuid, thread_id: Uuid) -> Result<(), DbError>;

    /// Accepted/changed-decision counts per object type for one vendor;
    /// feeds the learned vendor-affinity bonus.
    async fn vendor_accept_counts(
        &self,
        yacht_id: Uuid,
        vendor_hash: &str,
    ) -> Result<Vec<(String, i64)>, DbError>;

    /// Current primary suggestion for a thread: `(object_type, object_id, score)`.
    async fn get_primary_suggestion(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<(String, Uuid, i32)>, DbError>;

    /// Sender hash recorded with the thread's extracted tokens.
    async fn get_thread_vendor_hash(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<String>, DbError>;

    /// All stored suggestions for a thread, primary first.
    async fn list_link_suggestions(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Vec<crate::models::StoredLinkDto>, DbError>;
}

/// Postgres-backed implementation.
pub struct PgSearchDatabase {
    pool: PgPool,
}

impl PgSearchDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_error(e: sqlx::Error) -> DbError {
        let msg = e.to_string();
        if is_unsupported(&msg) { DbError::Unsupported(msg) } else { DbError::Query(msg) }
    }
}

/// Recognize "feature not installed" errors so the wave runner can skip
/// instead of fail: missing pg_trgm similarity(), missing vector operator
/// class, or an undeployed RPC.
fn is_unsupported(message: &str) -> bool {
    let lowered = message.to_lowercase();
    (lowered.contains("does not exist")
        && (lowered.contains("similarity")
            || lowered.contains("vector")
            || lowered.contains("match_link_targets")))
        || lowered.contains("operator does not exist: vector")
}

fn bind_params<'q>(
    mut query: sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments>,
    params: &'q [ParamValue],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, Value, sqlx::postgres::PgArguments> {
    for p in params {
        query = match p {
            ParamValue::Text(s) => query.bind(s),
            ParamValue::Uuid(u) => query.bind(u),
            ParamValue::Int(i) => query.bind(i),
            ParamValue::Float(f) => query.bind(f),
            ParamValue::TextArray(a) => query.bind(a),
        };
    }
    query
}

/// Render an embedding in pgvector input syntax.
fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

#[async_trait]
impl SearchDatabase for PgSearchDatabase {
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<Vec<serde_json::Map<String, Value>>, DbError> {
        // Decode through row_to_json so heterogeneous UNION selects come
        // back as one JSON column regardless of their shape.
        let wrapped = format!("SELECT row_to_json(_q)::jsonb FROM (\n{sql}\n) AS _q");

        let query = sqlx::query_scalar::<_, Value>(&wrapped);
        let rows =
            bind_params(query, params).fetch_all(&self.pool).await.map_err(Self::map_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }

    async fn match_link_targets(
        &self,
        query: &LinkTargetQuery,
    ) -> Result<Vec<LinkTargetRow>, DbError> {
        let embedding = query.query_embedding.as_deref().map(vector_literal);

        let rows = sqlx::query_as::<
            _,
            (String, Uuid, String, f64, f64, f64, f64, i32, i32, Value),
        >(
            "SELECT object_type, object_id, label, s_text, s_vector, s_recency, s_bias, \
             rank_text, rank_vector, payload \
             FROM match_link_targets($1, $2, $3::vector, $4, $5, $6, $7)",
        )
        .bind(query.yacht_id)
        .bind(&query.query_text)
        .bind(embedding)
        .bind(query.object_types.as_deref())
        .bind(query.role.as_deref())
        .bind(query.days_back)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_error)?;

        Ok(rows
            .into_iter()
            .map(
                |(
                    object_type,
                    object_id,
                    label,
                    s_text,
                    s_vector,
                    s_recency,
                    s_bias,
                    rank_text,
                    rank_vector,
                    payload,
                )| LinkTargetRow {
                    object_type,
                    object_id,
                    label,
                    s_text,
                    s_vector,
                    s_recency,
                    s_bias,
                    rank_text,
                    rank_vector,
                    payload,
                },
            )
            .collect())
    }

    async fn insert_link_suggestion(
        &self,
        record: &LinkSuggestionRecord,
    ) -> Result<Uuid, DbError> {
        let id: (Uuid,) = sqlx::query_as(
            "INSERT INTO email_links \
             (yacht_id, thread_id, object_type, object_id, confidence, is_primary, \
              score, score_breakdown, suggested_reason, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id",
        )
        .bind(record.yacht_id)
        .bind(record.thread_id)
        .bind(&record.object_type)
        .bind(record.object_id)
        .bind(record.confidence.as_str())
        .bind(record.is_primary)
        .bind(record.score)
        .bind(&record.score_breakdown)
        .bind(record.suggested_reason.as_str())
        .bind(record.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_error)?;
        Ok(id.0)
    }

    async fn insert_link_decision(&self, record: &LinkDecisionRecord) -> Result<Uuid, DbError> {
        let id: (Uuid,) = sqlx::query_as(
            "INSERT INTO email_link_decisions \
             (yacht_id, thread_id, action, object_type, object_id, \
              prior_object_type, prior_object_id, prior_score, vendor_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(record.yacht_id)
        .bind(record.thread_id)
        .bind(record.action.as_str())
        .bind(record.object_type.as_deref())
        .bind(record.object_id)
        .bind(record.prior_object_type.as_deref())
        .bind(record.prior_object_id)
        .bind(record.prior_score)
        .bind(record.vendor_hash.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(Self::map_error)?;
        Ok(id.0)
    }

    async fn save_thread_tokens(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
        tokens: &Value,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE email_threads SET extracted_tokens = $3, suggestions_generated_at = now() \
             WHERE yacht_id = $1 AND id = $2",
        )
        .bind(yacht_id)
        .bind(thread_id)
        .bind(tokens)
        .execute(&self.pool)
        .await
        .map_err(Self::map_error)?;
        Ok(())
    }

    async fn supersede_primary(&self, yacht_id: Uuid, thread_id: Uuid) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE email_links SET is_primary = false, is_active = false \
             WHERE yacht_id = $1 AND thread_id = $2 AND is_primary = true",
        )
        .bind(yacht_id)
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .map_err(Self::map_error)?;
        Ok(())
    }

    async fn vendor_accept_counts(
        &self,
        yacht_id: Uuid,
        vendor_hash: &str,
    ) -> Result<Vec<(String, i64)>, DbError> {
        sqlx::query_as(
            "SELECT object_type, count(*) FROM email_link_decisions \
             WHERE yacht_id = $1 AND vendor_hash = $2 \
               AND action IN ('accept', 'change') \
               AND object_type IS NOT NULL \
             GROUP BY object_type",
        )
        .bind(yacht_id)
        .bind(vendor_hash)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::map_error)
    }

    async fn get_primary_suggestion(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<(String, Uuid, i32)>, DbError> {
        sqlx::query_as(
            "SELECT object_type, object_id, score FROM email_links \
             WHERE yacht_id = $1 AND thread_id = $2 AND is_primary = true \
             LIMIT 1",
        )
        .bind(yacht_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_error)
    }

    async fn get_thread_vendor_hash(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<String>, DbError> {
        let row: Option<(Option<Value>,)> = sqlx::query_as(
            "SELECT extracted_tokens FROM email_threads WHERE yacht_id = $1 AND id = $2",
        )
        .bind(yacht_id)
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::map_error)?;

        Ok(row
            .and_then(|(tokens,)| tokens)
            .and_then(|t| {
                t.pointer("/vendor/sender_hash").and_then(|v| v.as_str().map(str::to_string))
            }))
    }

    async fn list_link_suggestions(
        &self,
        yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Vec<crate::models::StoredLinkDto>, DbError> {
        use crate::models::{LinkConfidence, StoredLinkDto};
        use chrono::{DateTime, Utc};

        let rows: Vec<(Uuid, String, Uuid, String, bool, bool, i32, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT id, object_type, object_id, confidence, is_primary, is_active, score, created_at \
                 FROM email_links \
                 WHERE yacht_id = $1 AND thread_id = $2 \
                 ORDER BY is_primary DESC, score DESC",
            )
            .bind(yacht_id)
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_error)?;

        Ok(rows
            .into_iter()
            .map(
                |(id, object_type, object_id, confidence, is_primary, is_active, score, created_at)| {
                    StoredLinkDto {
                        id,
                        object_type,
                        object_id,
                        confidence: match confidence.as_str() {
                            "deterministic" => LinkConfidence::Deterministic,
                            "suggested" => LinkConfidence::Suggested,
                            _ => LinkConfidence::None,
                        },
                        is_primary,
                        is_active,
                        score,
                        created_at,
                    }
                },
            )
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_detection_matches_missing_extensions() {
        assert!(is_unsupported("function similarity(text, text) does not exist"));
        assert!(is_unsupported("operator does not exist: vector <=> vector"));
        assert!(is_unsupported("function match_link_targets(...) does not exist"));
        assert!(!is_unsupported("relation \"pms_parts\" does not exist for real"));
        assert!(!is_unsupported("connection refused"));
    }

    #[test]
    fn vector_literal_is_pgvector_syntax() {
        assert_eq!(vector_literal(&[0.5, -1.0]), "[0.5,-1]");
        assert_eq!(vector_literal(&[]), "[]");
    }
}
