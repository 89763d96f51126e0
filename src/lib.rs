//! Pelorus Library
//!
//! Federated wave-based search planner/executor for a multi-tenant yacht
//! maintenance database, plus the email linking ladder.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use services::linking::LinkingLadder;
pub use services::search::SearchService;
pub use services::{PgSearchDatabase, SearchDatabase};

/// Application shared state
///
/// Rust's type system is the DI container: every service is an Arc and the
/// state clones cheaply into each handler.
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub db: Arc<dyn SearchDatabase>,
    pub search_service: Arc<SearchService>,
    pub linking_ladder: Arc<LinkingLadder>,
}

#[cfg(test)]
mod tests;
