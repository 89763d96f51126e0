//! User scope resolution.
//!
//! The scope is re-derived from server-side trust on every request; the
//! request body only names the user and role claims already established by
//! the session layer. Nothing in the scope is accepted from the client as-is.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Captain,
    Engineer,
    Crew,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Captain => "captain",
            UserRole::Engineer => "engineer",
            UserRole::Crew => "crew",
        }
    }
}

/// The caller's accessible tenant and readable table set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserScope {
    pub yacht_id: Uuid,
    pub user_id: String,
    pub role: UserRole,
    pub readable_tables: BTreeSet<String>,
}

const ALL_TABLES: &[&str] = &[
    "pms_parts",
    "v_inventory",
    "pms_equipment",
    "pms_faults",
    "search_fault_code_catalog",
    "pms_work_orders",
    "purchase_orders",
    "doc_metadata",
    "graph_nodes",
    "symptom_aliases",
    "email_threads",
];

/// Tables withheld from crew: procurement and correspondence.
const CREW_EXCLUDED: &[&str] = &["purchase_orders", "email_threads"];

impl UserScope {
    /// Resolve the scope for a request. Captains and engineers read every
    /// registered table; crew lose the procurement and email surfaces.
    pub fn resolve(yacht_id: Uuid, user_id: &str, role: UserRole) -> Self {
        let readable_tables: BTreeSet<String> = match role {
            UserRole::Captain | UserRole::Engineer => {
                ALL_TABLES.iter().map(|t| (*t).to_string()).collect()
            },
            UserRole::Crew => ALL_TABLES
                .iter()
                .filter(|t| !CREW_EXCLUDED.contains(t))
                .map(|t| (*t).to_string())
                .collect(),
        };

        Self { yacht_id, user_id: user_id.to_string(), role, readable_tables }
    }

    pub fn can_read(&self, table: &str) -> bool {
        self.readable_tables.contains(table)
    }
}
