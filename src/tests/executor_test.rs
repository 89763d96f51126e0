// Probe executor behavior: waves, budgets, dedup, failures

use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::services::search::CapabilityRegistry;
use crate::services::search::capability::EntityType;
use crate::services::search::executor::{ProbeExecutor, ProbeStatus};
use crate::services::search::scope::{UserRole, UserScope};
use crate::services::search::surface::SurfaceState;
use crate::tests::common::{
    MockDatabase, create_search_service, equipment_row, part_row, tenant, work_order_row,
};
use crate::utils::ApiError;

fn scope() -> UserScope {
    UserScope::resolve(tenant(), "user-1", UserRole::Engineer)
}

fn executor(db: Arc<MockDatabase>) -> ProbeExecutor {
    ProbeExecutor::new(db, CapabilityRegistry::builtin(), Config::default().search)
}

#[tokio::test]
async fn union_statement_is_the_primary_strategy() {
    let db = Arc::new(MockDatabase::new());
    db.script(
        "pms_parts",
        "part_number = ",
        vec![part_row(Uuid::new_v4(), "ENG-0008-103", "Fuel Filter")],
    );

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "ENG-0008-103",
        &[(EntityType::PartNumber, "ENG-0008-103".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db.clone()).execute(&plan).await.unwrap();
    assert!(!outcome.rows.is_empty());
    assert!(outcome.wave_traces.iter().all(|w| w.strategy == "union"));

    // One fused statement per tier+wave, capped by the global limit.
    for (sql, _) in db.executed.lock().unwrap().iter() {
        assert!(sql.trim_end().ends_with("LIMIT 50"), "statement: {sql}");
    }
}

#[tokio::test]
async fn exact_wave_collects_annotated_rows() {
    let db = Arc::new(MockDatabase::new());
    db.script("pms_parts", "part_number = ", vec![part_row(Uuid::new_v4(), "ENG-0008-103", "Fuel Filter")]);

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "ENG-0008-103",
        &[(EntityType::PartNumber, "ENG-0008-103".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db).execute(&plan).await.unwrap();
    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].table, "pms_parts");
    assert_eq!(outcome.rows[0].object_type, "part");
    assert!(outcome.tables_hit.contains(&"pms_parts".to_string()));
    assert_eq!(outcome.waves_executed, 1);
}

#[tokio::test]
async fn early_exit_stops_later_waves() {
    let db = Arc::new(MockDatabase::new());
    let rows: Vec<_> = (0..6)
        .map(|i| equipment_row(Uuid::new_v4(), &format!("GEN{i}"), &format!("Generator {i}")))
        .collect();
    // Everything lands already in the exact wave.
    db.script("pms_equipment", "WHERE yacht_id = $1", rows);

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator",
        &[(EntityType::EquipmentName, "Generator".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db.clone()).execute(&plan).await.unwrap();
    assert!(outcome.early_exit);
    assert!(outcome.rows.len() >= 5);
    assert!(
        !db.executed_sql().iter().any(|sql| sql.contains("ILIKE")),
        "later waves must not run after early exit"
    );
}

#[tokio::test]
async fn duplicate_primary_keys_dedup() {
    let db = Arc::new(MockDatabase::new());
    let id = Uuid::new_v4();
    let row = part_row(id, "ENG-0008-103", "Fuel Filter");
    db.script("pms_parts", "part_number = ", vec![row.clone(), row]);

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "ENG-0008-103",
        &[(EntityType::PartNumber, "ENG-0008-103".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db).execute(&plan).await.unwrap();
    assert_eq!(outcome.rows.len(), 1);
}

#[tokio::test]
async fn unsupported_trigram_is_skipped_not_failed() {
    let db = Arc::new(MockDatabase::new());
    db.mark_unsupported("similarity(");
    db.script(
        "pms_equipment",
        "name ILIKE",
        vec![equipment_row(Uuid::new_v4(), "GEN1", "Generator 1")],
    );

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator 1",
        &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db).execute(&plan).await.unwrap();
    assert!(!outcome.rows.is_empty(), "ILIKE rows survive a skipped trigram wave");
    let skipped: Vec<_> = outcome
        .wave_traces
        .iter()
        .filter(|w| w.skipped)
        .collect();
    assert!(!skipped.is_empty(), "trigram wave should be marked skipped");
}

#[tokio::test]
async fn single_probe_failure_recovers_locally() {
    let db = Arc::new(MockDatabase::new());
    db.mark_failing("FROM graph_nodes");
    db.script(
        "pms_equipment",
        "name ILIKE",
        vec![equipment_row(Uuid::new_v4(), "GEN1", "Generator 1")],
    );

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator 1",
        &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db).execute(&plan).await.unwrap();
    assert!(!outcome.rows.is_empty());
    assert!(
        outcome
            .probe_traces
            .iter()
            .any(|t| t.table == "graph_nodes" && matches!(t.status, ProbeStatus::Error)),
        "the failing probe is recorded in trace, not raised"
    );
    // The broken statement fell back to per-table probes for its wave.
    assert!(outcome.wave_traces.iter().any(|w| w.strategy == "per_table"));
}

#[tokio::test]
async fn deadline_returns_partial_results() {
    let db = Arc::new(MockDatabase::new());
    db.set_delay_ms(80);

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator 1",
        &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let mut config = Config::default().search;
    config.total_budget_ms = 20;
    config.wave_budgets.exact_ms = 20;
    let executor = ProbeExecutor::new(db, CapabilityRegistry::builtin(), config);

    let outcome = executor.execute(&plan).await.unwrap();
    assert!(outcome.deadline_exceeded);
    assert!(
        outcome
            .probe_traces
            .iter()
            .all(|t| matches!(t.status, ProbeStatus::BudgetExceeded | ProbeStatus::Cancelled)),
    );
}

#[tokio::test]
async fn queue_cap_fails_fast_with_overloaded() {
    let db = Arc::new(MockDatabase::new());
    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator 1",
        &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let mut config = Config::default().search;
    config.queue_cap = 0;
    let executor = ProbeExecutor::new(db, CapabilityRegistry::builtin(), config);

    match executor.execute(&plan).await {
        Err(ApiError::Overloaded(_)) => {},
        other => panic!("expected overloaded fast-fail, got {other:?}"),
    }
}

#[tokio::test]
async fn open_work_order_rows_flow_through() {
    let db = Arc::new(MockDatabase::new());
    db.script(
        "pms_work_orders",
        "wo_number = ",
        vec![work_order_row(Uuid::new_v4(), "WO-1234", "Service generator", "open")],
    );

    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "WO-1234",
        &[(EntityType::WoNumber, "WO-1234".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let outcome = executor(db).execute(&plan).await.unwrap();
    assert_eq!(outcome.rows[0].object_type, "work_order");
}
