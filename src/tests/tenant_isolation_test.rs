// Tenant isolation invariants

use std::sync::Arc;

use crate::config::Config;
use crate::services::search::capability::EntityType;
use crate::services::search::executor::ProbeExecutor;
use crate::services::search::operators::{ParamValue, Wave};
use crate::services::search::scope::{UserRole, UserScope};
use crate::services::search::sqlgen;
use crate::services::search::surface::SurfaceState;
use crate::services::search::{CapabilityRegistry, SearchService};
use crate::tests::common::{MockDatabase, create_search_service, other_tenant, tenant};
use crate::utils::ApiError;

fn scope() -> UserScope {
    UserScope::resolve(tenant(), "user-1", UserRole::Engineer)
}

fn service() -> SearchService {
    create_search_service(Arc::new(MockDatabase::new()))
}

/// Representative query mix covering every lane that generates SQL.
fn sample_plans(
    service: &SearchService,
) -> Vec<crate::services::search::ExecutionPlan> {
    vec![
        service.prepare(
            "ENG-0008-103",
            &[(EntityType::PartNumber, "ENG-0008-103".to_string(), 1.0)],
            scope(),
            SurfaceState::Search,
        ),
        service.prepare(
            "Generator 1",
            &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
            scope(),
            SurfaceState::Search,
        ),
        service.prepare(
            "fuel filter MTU",
            &[
                (EntityType::PartName, "fuel filter".to_string(), 1.0),
                (EntityType::Manufacturer, "MTU".to_string(), 1.0),
            ],
            scope(),
            SurfaceState::Search,
        ),
        service.prepare("overheating noise", &[], scope(), SurfaceState::Search),
    ]
}

#[tokio::test]
async fn every_statement_leads_with_the_tenant_predicate() {
    let service = service();
    let registry = CapabilityRegistry::builtin();
    let config = Config::default().search;

    for plan in sample_plans(&service) {
        for stmt in sqlgen::generate_plan_sql(&plan, registry, &config) {
            assert_eq!(stmt.params[0], ParamValue::Uuid(tenant()));
            for select in stmt.sql.split("UNION ALL") {
                let where_clause = select.split("WHERE").nth(1).expect("WHERE present");
                assert!(
                    where_clause.trim_start().starts_with("yacht_id = $1"),
                    "first predicate must be the tenant column: {select}"
                );
            }
        }
    }
}

#[tokio::test]
async fn every_probe_leads_with_the_tenant_parameter() {
    let service = service();
    let registry = CapabilityRegistry::builtin();
    let config = Config::default().search;

    for plan in sample_plans(&service) {
        for batch in &plan.batches {
            for wave in &batch.wave_order {
                for probe in sqlgen::build_wave_probes(&plan, batch, *wave, registry, &config) {
                    assert_eq!(probe.params[0], ParamValue::Uuid(tenant()));
                    assert!(probe.sql.contains("WHERE yacht_id = $1"));
                }
            }
        }
    }
}

#[tokio::test]
async fn executor_aborts_on_foreign_tenant_probe() {
    let db = Arc::new(MockDatabase::new());
    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "ENG-0008-103",
        &[(EntityType::PartNumber, "ENG-0008-103".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let registry = CapabilityRegistry::builtin();
    let config = Config::default().search;
    let executor = ProbeExecutor::new(db, registry, config.clone());

    let batch = &plan.batches[0];
    let mut probes = sqlgen::build_wave_probes(&plan, batch, Wave::Exact, registry, &config);
    probes[0].params[0] = ParamValue::Uuid(other_tenant());

    match executor.enforce_tenant_invariant(&plan, &probes) {
        Err(ApiError::TenantMismatch(_)) => {},
        other => panic!("expected tenant mismatch abort, got {other:?}"),
    }
}

#[tokio::test]
async fn executed_statements_bind_the_request_tenant() {
    let db = Arc::new(MockDatabase::new());
    let service = create_search_service(db.clone());
    let plan = service.prepare(
        "Generator 1",
        &[(EntityType::EquipmentName, "Generator 1".to_string(), 1.0)],
        scope(),
        SurfaceState::Search,
    );

    let executor =
        ProbeExecutor::new(db.clone(), CapabilityRegistry::builtin(), Config::default().search);
    executor.execute(&plan).await.unwrap();

    let executed = db.executed.lock().unwrap();
    assert!(!executed.is_empty());
    for (_, params) in executed.iter() {
        assert_eq!(params[0], ParamValue::Uuid(tenant()));
    }
}

#[tokio::test]
async fn lookup_probes_are_tenant_scoped() {
    let registry = CapabilityRegistry::builtin();
    let config = Config::default().search;
    let probe = sqlgen::lookup_probe(
        registry,
        &config,
        tenant(),
        "pms_work_orders",
        &[(
            "wo_number",
            crate::services::search::Operator::Ilike,
            ParamValue::Text("%1234%".to_string()),
        )],
    )
    .expect("declared lookup compiles");

    assert_eq!(probe.params[0], ParamValue::Uuid(tenant()));
    assert!(probe.sql.contains("WHERE yacht_id = $1"));
}

#[tokio::test]
async fn undeclared_lookup_columns_are_rejected() {
    let registry = CapabilityRegistry::builtin();
    let config = Config::default().search;
    let probe = sqlgen::lookup_probe(
        registry,
        &config,
        tenant(),
        "pms_work_orders",
        &[(
            "secret_column",
            crate::services::search::Operator::Ilike,
            ParamValue::Text("%x%".to_string()),
        )],
    );
    assert!(probe.is_none());
}
