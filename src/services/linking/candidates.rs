//! Candidate finders for the linking ladder.
//!
//! Every lookup compiles through the same operator templates as the search
//! path; this module decides which columns to ask and maps the returned rows
//! into scored link candidates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{LinkingConfig, SearchConfig};
use crate::services::database::{LinkTargetQuery, SearchDatabase};
use crate::services::search::capability::CapabilityRegistry;
use crate::services::search::operators::{Operator, ParamValue};
use crate::services::search::sqlgen;

use super::fusion::FusionInputs;
use super::score::{LinkCandidate, MatchReason};
use super::token_extractor::{ExtractedTokens, IdKind, PartKind, VendorSignals};

/// Statuses treated as "open/active" for the state bonus.
const OPEN_STATUSES: &[&str] = &["open", "in_progress", "pending", "active"];

pub struct CandidateFinder {
    db: Arc<dyn SearchDatabase>,
    registry: &'static CapabilityRegistry,
    search_config: SearchConfig,
    linking_config: LinkingConfig,
}

impl CandidateFinder {
    pub fn new(
        db: Arc<dyn SearchDatabase>,
        search_config: SearchConfig,
        linking_config: LinkingConfig,
    ) -> Self {
        Self { db, registry: CapabilityRegistry::builtin(), search_config, linking_config }
    }

    /// L1: explicit id lookups in priority order.
    pub async fn find_by_explicit_ids(
        &self,
        yacht_id: Uuid,
        tokens: &ExtractedTokens,
    ) -> Vec<LinkCandidate> {
        let mut candidates = Vec::new();

        for (kind, reason, table, column) in [
            (IdKind::WoId, MatchReason::WoIdMatch, "pms_work_orders", "wo_number"),
            (IdKind::PoId, MatchReason::PoIdMatch, "purchase_orders", "po_number"),
            (IdKind::FaultId, MatchReason::FaultIdMatch, "pms_faults", "fault_code"),
            (IdKind::EqId, MatchReason::EqIdMatch, "pms_equipment", "code"),
        ] {
            let Some(values) = tokens.ids.get(&kind) else { continue };
            for value in values {
                let found = self
                    .lookup(
                        yacht_id,
                        table,
                        &[(column, Operator::Ilike, ParamValue::Text(format!("%{value}%")))],
                        reason,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        if let Some(uuids) = tokens.ids.get(&IdKind::UuidId) {
            for value in uuids {
                let Ok(id) = Uuid::parse_str(value) else { continue };
                let found = self
                    .lookup(
                        yacht_id,
                        "pms_work_orders",
                        &[("id", Operator::Exact, ParamValue::Uuid(id))],
                        MatchReason::UuidMatch,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        candidates
    }

    /// L2: procurement context. Quote/invoice ids link through purchase
    /// orders and the sender's open work orders.
    pub async fn find_procurement(
        &self,
        yacht_id: Uuid,
        tokens: &ExtractedTokens,
    ) -> Vec<LinkCandidate> {
        let mut candidates = Vec::new();

        for (kind, reason) in [
            (IdKind::QuoteId, MatchReason::QuoteIdMatch),
            (IdKind::InvoiceId, MatchReason::InvoiceIdMatch),
        ] {
            let Some(values) = tokens.ids.get(&kind) else { continue };
            for value in values {
                let found = self
                    .lookup(
                        yacht_id,
                        "purchase_orders",
                        &[("po_number", Operator::Ilike, ParamValue::Text(format!("%{value}%")))],
                        reason,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        if let Some(vendor) = &tokens.vendor {
            candidates.extend(self.find_vendor_open_work_orders(yacht_id, vendor).await);
        }

        candidates
    }

    /// L3: part and serial numbers against the parts catalog and equipment.
    pub async fn find_parts_equipment(
        &self,
        yacht_id: Uuid,
        tokens: &ExtractedTokens,
    ) -> Vec<LinkCandidate> {
        let mut candidates = Vec::new();

        if let Some(serials) = tokens.parts.get(&PartKind::SerialNumber) {
            for serial in serials {
                let found = self
                    .lookup(
                        yacht_id,
                        "pms_equipment",
                        &[(
                            "serial_number",
                            Operator::Exact,
                            ParamValue::Text(serial.to_uppercase()),
                        )],
                        MatchReason::SerialMatch,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        if let Some(numbers) = tokens.parts.get(&PartKind::PartNumber) {
            for number in numbers {
                let found = self
                    .lookup(
                        yacht_id,
                        "pms_parts",
                        &[(
                            "part_number",
                            Operator::Exact,
                            ParamValue::Text(number.to_uppercase()),
                        )],
                        MatchReason::PartNumberMatch,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        if let Some(oems) = tokens.parts.get(&PartKind::OemNumber) {
            for oem in oems {
                let found = self
                    .lookup(
                        yacht_id,
                        "pms_parts",
                        &[("oem_number", Operator::Ilike, ParamValue::Text(format!("%{oem}%")))],
                        MatchReason::OemNumberMatch,
                    )
                    .await;
                candidates.extend(found);
            }
        }

        candidates
    }

    /// L4: the sender's open work orders, by hash first and domain stem as
    /// fallback. Personal domains are filtered by the caller.
    pub async fn find_vendor_open_work_orders(
        &self,
        yacht_id: Uuid,
        vendor: &VendorSignals,
    ) -> Vec<LinkCandidate> {
        let mut candidates = self
            .lookup(
                yacht_id,
                "pms_work_orders",
                &[(
                    "vendor_hash",
                    Operator::Exact,
                    ParamValue::Text(vendor.sender_hash.clone()),
                )],
                MatchReason::VendorHashMatch,
            )
            .await;

        if candidates.is_empty()
            && let Some(stem) = vendor.sender_domain.split('.').next().filter(|s| s.len() >= 3)
        {
            candidates = self
                .lookup(
                    yacht_id,
                    "pms_work_orders",
                    &[("vendor_name", Operator::Ilike, ParamValue::Text(format!("%{stem}%")))],
                    MatchReason::VendorDomainMatch,
                )
                .await;
        }

        // Only open work orders are plausible link targets for vendor mail.
        candidates.retain(|c| c.is_open);
        candidates
    }

    /// Open work orders already tied to a matched equipment item.
    pub async fn find_open_work_orders_by_equipment(
        &self,
        yacht_id: Uuid,
        equipment_id: Uuid,
    ) -> Vec<LinkCandidate> {
        let mut candidates = self
            .lookup(
                yacht_id,
                "pms_work_orders",
                &[("equipment_id", Operator::Exact, ParamValue::Uuid(equipment_id))],
                MatchReason::EquipmentWoLink,
            )
            .await;
        candidates.retain(|c| c.is_open);
        candidates
    }

    /// L2.5: fused hybrid retrieval over the search index.
    pub async fn find_link_targets(
        &self,
        yacht_id: Uuid,
        query_text: &str,
        query_embedding: Option<Vec<f32>>,
        role: Option<String>,
    ) -> Vec<LinkCandidate> {
        let query = LinkTargetQuery {
            yacht_id,
            query_text: query_text.to_string(),
            query_embedding,
            object_types: None,
            role,
            days_back: self.linking_config.days_back,
            limit: self.linking_config.candidate_limit,
        };

        let rows = match self.db.match_link_targets(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                // Missing index extension degrades L2.5 to "no candidates".
                tracing::debug!("hybrid retrieval unavailable: {e}");
                return Vec::new();
            },
        };

        rows.into_iter()
            .map(|row| {
                let updated_at = row
                    .payload
                    .get("updated_at")
                    .and_then(Value::as_str)
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                let is_open = row
                    .payload
                    .get("status")
                    .and_then(Value::as_str)
                    .is_some_and(is_open_status);
                LinkCandidate::new(
                    &row.object_type,
                    row.object_id,
                    &row.label,
                    MatchReason::HybridSearchIndex,
                )
                .with_state(updated_at, is_open)
                .with_fusion(FusionInputs {
                    s_text: row.s_text,
                    s_vector: row.s_vector,
                    s_recency: row.s_recency,
                    s_bias: row.s_bias,
                    rank_text: row.rank_text,
                    rank_vector: row.rank_vector,
                })
            })
            .collect()
    }

    async fn lookup(
        &self,
        yacht_id: Uuid,
        table: &str,
        clauses: &[(&str, Operator, ParamValue)],
        reason: MatchReason,
    ) -> Vec<LinkCandidate> {
        let Some(probe) =
            sqlgen::lookup_probe(self.registry, &self.search_config, yacht_id, table, clauses)
        else {
            return Vec::new();
        };

        let rows = match self.db.fetch_rows(&probe.sql, &probe.params).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("candidate lookup on {table} failed: {e}");
                return Vec::new();
            },
        };

        rows.into_iter()
            .filter_map(|row| self.candidate_from_row(table, reason, row))
            .collect()
    }

    fn candidate_from_row(
        &self,
        table: &str,
        reason: MatchReason,
        row: serde_json::Map<String, Value>,
    ) -> Option<LinkCandidate> {
        let capability = self.registry.table(table)?;
        let object_id = row
            .get(&capability.primary_key)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())?;

        let label = ["wo_number", "po_number", "fault_code", "code", "part_number", "title", "name"]
            .iter()
            .filter_map(|k| row.get(*k))
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .next()
            .unwrap_or("unlabelled")
            .to_string();

        let updated_at = ["updated_at", "reported_at", "created_at"]
            .iter()
            .filter_map(|k| row.get(*k))
            .filter_map(Value::as_str)
            .filter_map(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .next();

        let is_open =
            row.get("status").and_then(Value::as_str).is_some_and(is_open_status);

        Some(
            LinkCandidate::new(&capability.object_type, object_id, &label, reason)
                .with_state(updated_at, is_open),
        )
    }
}

fn is_open_status(status: &str) -> bool {
    OPEN_STATUSES.contains(&status.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_status_matching_is_case_insensitive() {
        assert!(is_open_status("Open"));
        assert!(is_open_status("IN_PROGRESS"));
        assert!(!is_open_status("completed"));
        assert!(!is_open_status("cancelled"));
    }
}
