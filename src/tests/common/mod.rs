// Common test utilities and helpers

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{LinkDecisionRecord, LinkSuggestionRecord, StoredLinkDto};
use crate::services::database::{DbError, LinkTargetQuery, LinkTargetRow, SearchDatabase};
use crate::services::embedding::EmbeddingClient;
use crate::services::linking::{CandidateFinder, LinkingLadder, VendorAffinityCache};
use crate::services::search::SearchService;
use crate::services::search::operators::ParamValue;

pub fn tenant() -> Uuid {
    Uuid::parse_str("85fe1119-b04c-41ac-80f1-829d23322598").unwrap()
}

pub fn other_tenant() -> Uuid {
    Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()
}

/// One scripted response: rows are returned when the statement targets the
/// table and contains the given SQL fragment.
struct ScriptEntry {
    table: String,
    fragment: String,
    rows: Vec<Map<String, Value>>,
}

/// Scriptable stand-in for the database collaborator. Statements are matched
/// by table plus SQL fragment; everything executed is recorded for
/// assertions.
#[derive(Default)]
pub struct MockDatabase {
    scripts: Mutex<Vec<ScriptEntry>>,
    unsupported_fragments: Mutex<Vec<String>>,
    failing_fragments: Mutex<Vec<String>>,
    pub executed: Mutex<Vec<(String, Vec<ParamValue>)>>,
    pub link_targets: Mutex<Vec<LinkTargetRow>>,
    pub suggestions: Mutex<Vec<LinkSuggestionRecord>>,
    pub decisions: Mutex<Vec<LinkDecisionRecord>>,
    pub thread_tokens: Mutex<HashMap<Uuid, Value>>,
    pub accept_counts: Mutex<Vec<(String, i64)>>,
    pub delay_ms: Mutex<u64>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script rows for statements on `table` containing `fragment`.
    pub fn script(&self, table: &str, fragment: &str, rows: Vec<Map<String, Value>>) {
        self.scripts.lock().unwrap().push(ScriptEntry {
            table: table.to_string(),
            fragment: fragment.to_string(),
            rows,
        });
    }

    /// Mark statements containing `fragment` as unsupported by the backend.
    pub fn mark_unsupported(&self, fragment: &str) {
        self.unsupported_fragments.lock().unwrap().push(fragment.to_string());
    }

    /// Mark statements containing `fragment` as plain query failures.
    pub fn mark_failing(&self, fragment: &str) {
        self.failing_fragments.lock().unwrap().push(fragment.to_string());
    }

    pub fn add_link_target(&self, row: LinkTargetRow) {
        self.link_targets.lock().unwrap().push(row);
    }

    pub fn set_delay_ms(&self, ms: u64) {
        *self.delay_ms.lock().unwrap() = ms;
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }
}

#[async_trait]
impl SearchDatabase for MockDatabase {
    async fn fetch_rows(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<Vec<Map<String, Value>>, DbError> {
        let delay = *self.delay_ms.lock().unwrap();
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        self.executed.lock().unwrap().push((sql.to_string(), params.to_vec()));

        for fragment in self.unsupported_fragments.lock().unwrap().iter() {
            if sql.contains(fragment.as_str()) {
                return Err(DbError::Unsupported(format!(
                    "function {fragment} does not exist"
                )));
            }
        }

        for fragment in self.failing_fragments.lock().unwrap().iter() {
            if sql.contains(fragment.as_str()) {
                return Err(DbError::Query("relation is broken".to_string()));
            }
        }

        let scripts = self.scripts.lock().unwrap();
        let mut rows = Vec::new();
        for entry in scripts.iter() {
            if sql.contains(&format!("FROM {}", entry.table)) && sql.contains(&entry.fragment) {
                // Statements select '<table>' AS _source; the mock fills it
                // in the same way for fused and per-table shapes.
                for mut row in entry.rows.iter().cloned() {
                    row.entry("_source".to_string())
                        .or_insert_with(|| Value::String(entry.table.clone()));
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    async fn match_link_targets(
        &self,
        _query: &LinkTargetQuery,
    ) -> Result<Vec<LinkTargetRow>, DbError> {
        Ok(self.link_targets.lock().unwrap().clone())
    }

    async fn insert_link_suggestion(
        &self,
        record: &LinkSuggestionRecord,
    ) -> Result<Uuid, DbError> {
        self.suggestions.lock().unwrap().push(record.clone());
        Ok(Uuid::new_v4())
    }

    async fn insert_link_decision(&self, record: &LinkDecisionRecord) -> Result<Uuid, DbError> {
        self.decisions.lock().unwrap().push(record.clone());
        Ok(Uuid::new_v4())
    }

    async fn save_thread_tokens(
        &self,
        _yacht_id: Uuid,
        thread_id: Uuid,
        tokens: &Value,
    ) -> Result<(), DbError> {
        self.thread_tokens.lock().unwrap().insert(thread_id, tokens.clone());
        Ok(())
    }

    async fn supersede_primary(&self, _yacht_id: Uuid, thread_id: Uuid) -> Result<(), DbError> {
        let mut suggestions = self.suggestions.lock().unwrap();
        for s in suggestions.iter_mut().filter(|s| s.thread_id == thread_id) {
            s.is_primary = false;
            s.is_active = false;
        }
        Ok(())
    }

    async fn vendor_accept_counts(
        &self,
        _yacht_id: Uuid,
        _vendor_hash: &str,
    ) -> Result<Vec<(String, i64)>, DbError> {
        Ok(self.accept_counts.lock().unwrap().clone())
    }

    async fn get_primary_suggestion(
        &self,
        _yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<(String, Uuid, i32)>, DbError> {
        Ok(self
            .suggestions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.thread_id == thread_id && s.is_primary)
            .map(|s| (s.object_type.clone(), s.object_id, s.score)))
    }

    async fn get_thread_vendor_hash(
        &self,
        _yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Option<String>, DbError> {
        Ok(self
            .thread_tokens
            .lock()
            .unwrap()
            .get(&thread_id)
            .and_then(|t| t.pointer("/vendor/sender_hash"))
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn list_link_suggestions(
        &self,
        _yacht_id: Uuid,
        thread_id: Uuid,
    ) -> Result<Vec<StoredLinkDto>, DbError> {
        Ok(self
            .suggestions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.thread_id == thread_id)
            .map(|s| StoredLinkDto {
                id: Uuid::new_v4(),
                object_type: s.object_type.clone(),
                object_id: s.object_id,
                confidence: s.confidence,
                is_primary: s.is_primary,
                is_active: s.is_active,
                score: s.score,
                created_at: Utc::now(),
            })
            .collect())
    }
}

/// Embedder returning a fixed unit-ish vector; enough for the hybrid path.
pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingClient for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Option<Vec<f32>> {
        Some(vec![0.01; 1536])
    }
}

pub fn create_search_service(db: Arc<MockDatabase>) -> SearchService {
    SearchService::new(db, Config::default())
}

pub fn create_ladder(db: Arc<MockDatabase>) -> LinkingLadder {
    let config = Config::default();
    let finder = CandidateFinder::new(
        db.clone() as Arc<dyn SearchDatabase>,
        config.search.clone(),
        config.linking.clone(),
    );
    LinkingLadder::new(
        db as Arc<dyn SearchDatabase>,
        finder,
        Arc::new(FixedEmbedder),
        Arc::new(VendorAffinityCache::new()),
        config.linking,
    )
}

/// Row builders for the mock corpus.
pub fn part_row(id: Uuid, part_number: &str, name: &str) -> Map<String, Value> {
    json_map(json!({
        "id": id.to_string(),
        "part_number": part_number,
        "name": name,
        "manufacturer": "MTU",
        "model": "16V2000",
        "location": "Engine Room",
        "updated_at": Utc::now().to_rfc3339(),
    }))
}

pub fn equipment_row(id: Uuid, code: &str, name: &str) -> Map<String, Value> {
    json_map(json!({
        "id": id.to_string(),
        "code": code,
        "name": name,
        "serial_number": "SN1234567",
        "manufacturer": "Kohler",
        "model": "80EOZD",
        "updated_at": Utc::now().to_rfc3339(),
    }))
}

pub fn work_order_row(id: Uuid, wo_number: &str, title: &str, status: &str) -> Map<String, Value> {
    json_map(json!({
        "id": id.to_string(),
        "wo_number": wo_number,
        "title": title,
        "vendor_name": "Acme Marine",
        "status": status,
        "updated_at": Utc::now().to_rfc3339(),
    }))
}

pub fn json_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}
