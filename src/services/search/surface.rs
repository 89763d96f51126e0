//! Surface state machine.
//!
//! The UI is a single-URL state machine; the active state decides the safe
//! default scopes and which ranking recipe applies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceState {
    Search,
    EmailInbox,
    EmailOpen,
    EmailSearch,
    EntityOpen,
    DocOpen,
}

impl SurfaceState {
    pub fn is_email_surface(self) -> bool {
        matches!(self, SurfaceState::EmailInbox | SurfaceState::EmailOpen | SurfaceState::EmailSearch)
    }

    /// Safe default table scopes when the user names no domain.
    pub fn default_scopes(self) -> &'static [&'static str] {
        match self {
            SurfaceState::Search => &[
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
            ],
            SurfaceState::EmailInbox | SurfaceState::EmailOpen | SurfaceState::EmailSearch => {
                &["email_threads"]
            },
            SurfaceState::EntityOpen => {
                &["pms_work_orders", "pms_equipment", "doc_metadata", "email_threads"]
            },
            SurfaceState::DocOpen => &["doc_metadata"],
        }
    }

    /// Ranking recipe name for this surface.
    pub fn recipe_name(self) -> &'static str {
        match self {
            SurfaceState::Search | SurfaceState::EntityOpen | SurfaceState::DocOpen => {
                "global_search"
            },
            SurfaceState::EmailInbox | SurfaceState::EmailOpen => "email_inbox",
            SurfaceState::EmailSearch => "email_search",
        }
    }
}

impl Default for SurfaceState {
    fn default() -> Self {
        SurfaceState::Search
    }
}
