//! SQL generation.
//!
//! The only place probes and statements are constructed. Every clause comes
//! from the operator templates; caller text travels exclusively through the
//! positional parameter list, with the tenant id always at `$1`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::SearchConfig;

use super::capability::CapabilityRegistry;
use super::operators::{Operator, OperatorTuning, ParamValue, Wave};
use super::planner::{BatchPlan, Conjunction, ExecutionPlan, ResolvedQuery};
use super::variants::{Variant, VariantForm};

/// The smallest executable query unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    pub probe_id: String,
    pub table: String,
    pub select_cols: Vec<String>,
    pub conjunction: Conjunction,
    pub wave: Wave,
    pub tier: u8,
    pub limit: u32,
    pub order_by: Option<String>,
    pub sql: String,
    /// `params[0]` is always the tenant id.
    pub params: Vec<ParamValue>,
}

/// One UNION-ALL statement covering a whole tier+wave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedStatement {
    pub tier: u8,
    pub wave: Wave,
    pub sql: String,
    pub params: Vec<ParamValue>,
    pub tables: Vec<String>,
}

/// Interns parameter values so identical values share one position.
struct ParamAllocator {
    params: Vec<ParamValue>,
    interned: HashMap<String, usize>,
}

impl ParamAllocator {
    fn new(tenant: ParamValue) -> Self {
        Self { params: vec![tenant], interned: HashMap::new() }
    }

    /// Positional ref ($n, 1-based) for a value, reusing existing positions
    /// for identical values.
    fn alloc(&mut self, value: &str) -> usize {
        if let Some(pos) = self.interned.get(value) {
            return *pos;
        }
        self.params.push(ParamValue::Text(value.to_string()));
        let pos = self.params.len();
        self.interned.insert(value.to_string(), pos);
        pos
    }
}

/// Variants eligible for a wave. EXACT takes the canonical form only; ILIKE
/// takes the wildcard forms; TRIGRAM takes the bare lowercased form.
fn wave_variants<'a>(variants: &'a [Variant], wave: Wave) -> Vec<&'a Variant> {
    variants
        .iter()
        .filter(|v| v.operator.wave() == wave)
        .filter(|v| wave != Wave::Exact || v.form == VariantForm::Canonical)
        .collect()
}

/// Render the WHERE tail (everything after the tenant predicate) for one
/// table. Returns `None` when nothing on the table serves this wave.
fn render_conditions(
    resolved: &ResolvedQuery,
    wave: Wave,
    alloc: &mut ParamAllocator,
    tuning: &OperatorTuning,
) -> Option<String> {
    let mut per_binding = Vec::new();

    for binding in &resolved.bindings {
        let mut clauses = Vec::new();
        for col in &binding.columns {
            for variant in wave_variants(&col.variants, wave) {
                let param = alloc.alloc(&variant.value);
                clauses.push(variant.operator.clause(
                    &col.column,
                    param,
                    col.json_key.as_deref(),
                    tuning,
                ));
            }
        }
        if clauses.is_empty() {
            continue;
        }
        if clauses.len() == 1 {
            per_binding.push(clauses.remove(0));
        } else {
            per_binding.push(format!("({})", clauses.join(" OR ")));
        }
    }

    if per_binding.is_empty() {
        return None;
    }

    let joiner = match resolved.conjunction {
        Conjunction::And => " AND ",
        Conjunction::Or => " OR ",
    };
    if per_binding.len() == 1 {
        Some(per_binding.remove(0))
    } else {
        Some(per_binding.join(joiner))
    }
}

fn select_list(registry: &CapabilityRegistry, table: &str) -> Option<(Vec<String>, u32, Option<String>, String)> {
    registry.table(table).map(|t| {
        (
            t.default_select.clone(),
            t.default_limit,
            t.default_order.clone(),
            t.yacht_id_column.clone(),
        )
    })
}

/// Build the per-table probes for one batch+wave. Each probe carries its own
/// parameter list with the tenant at `$1`.
pub fn build_wave_probes(
    plan: &ExecutionPlan,
    batch: &BatchPlan,
    wave: Wave,
    registry: &CapabilityRegistry,
    config: &SearchConfig,
) -> Vec<Probe> {
    let tuning = config.operator_tuning();
    let mut probes = Vec::new();

    for table in &batch.tables {
        let Some(resolved) = plan.resolved_for(table) else { continue };
        let Some((select_cols, table_limit, order_by, tenant_col)) = select_list(registry, table)
        else {
            continue;
        };
        let limit = table_limit.min(config.default_table_limit);

        let mut alloc = ParamAllocator::new(ParamValue::Uuid(plan.scope.yacht_id));
        let Some(conditions) = render_conditions(resolved, wave, &mut alloc, &tuning) else {
            continue;
        };

        let mut sql = format!(
            "SELECT '{table}' AS _source, {select}\nFROM {table}\nWHERE {tenant_col} = $1\n  AND {conditions}",
            select = select_cols.join(", "),
        );
        if let Some(order) = &order_by {
            sql.push_str(&format!("\nORDER BY {order}"));
        }
        sql.push_str(&format!("\nLIMIT {limit}"));

        probes.push(Probe {
            probe_id: format!("{table}-t{}-w{}", batch.tier, wave.as_index()),
            table: table.clone(),
            select_cols,
            conjunction: resolved.conjunction,
            wave,
            tier: batch.tier,
            limit,
            order_by,
            sql,
            params: alloc.params,
        });
    }

    probes
}

/// Build the UNION-ALL statement for one batch+wave: the per-table selects
/// share one parameter list, identical values share a position, and the
/// whole statement is capped by the global limit.
pub fn build_union_statement(
    plan: &ExecutionPlan,
    batch: &BatchPlan,
    wave: Wave,
    registry: &CapabilityRegistry,
    config: &SearchConfig,
) -> Option<GeneratedStatement> {
    let tuning = config.operator_tuning();
    let mut alloc = ParamAllocator::new(ParamValue::Uuid(plan.scope.yacht_id));
    let mut parts = Vec::new();
    let mut tables = Vec::new();

    for table in &batch.tables {
        let Some(resolved) = plan.resolved_for(table) else { continue };
        let Some((select_cols, table_limit, order_by, tenant_col)) = select_list(registry, table)
        else {
            continue;
        };
        let limit = table_limit.min(config.default_table_limit);

        let Some(conditions) = render_conditions(resolved, wave, &mut alloc, &tuning) else {
            continue;
        };

        let order = order_by.map(|o| format!("\nORDER BY {o}")).unwrap_or_default();
        parts.push(format!(
            "(SELECT '{table}' AS _source, {select}\nFROM {table}\nWHERE {tenant_col} = $1\n  AND {conditions}{order}\nLIMIT {limit})",
            select = select_cols.join(", "),
        ));
        tables.push(table.clone());
    }

    if parts.is_empty() {
        return None;
    }

    let sql = format!("{}\nLIMIT {}", parts.join("\nUNION ALL\n"), config.global_limit);
    Some(GeneratedStatement { tier: batch.tier, wave, sql, params: alloc.params, tables })
}

/// Build a single-table lookup probe for paths outside the planner (the
/// linking ladder's candidate finders). Clauses AND together after the
/// tenant predicate; every column must be declared in the registry with the
/// requested operator, or be the table's primary key matched exactly.
pub fn lookup_probe(
    registry: &CapabilityRegistry,
    config: &SearchConfig,
    yacht_id: uuid::Uuid,
    table: &str,
    clauses: &[(&str, Operator, ParamValue)],
) -> Option<Probe> {
    let capability = registry.table(table)?;
    let tuning = config.operator_tuning();

    let mut params = vec![ParamValue::Uuid(yacht_id)];
    let mut rendered = Vec::new();

    for (column, operator, value) in clauses {
        let allowed = if *column == capability.primary_key {
            *operator == Operator::Exact
        } else {
            capability.column(column).is_some_and(|c| c.supports(*operator))
        };
        if !allowed {
            tracing::warn!("lookup on {table}.{column} with {operator:?} not declared; dropped");
            return None;
        }

        params.push(value.clone());
        let json_key = capability.column(column).and_then(|c| c.json_keys.as_ref()).and_then(|k| k.first());
        rendered.push(operator.clause(column, params.len(), json_key.map(String::as_str), &tuning));
    }

    if rendered.is_empty() {
        return None;
    }

    let limit = capability.default_limit.min(config.default_table_limit);
    let mut sql = format!(
        "SELECT '{table}' AS _source, {select}\nFROM {table}\nWHERE {tenant_col} = $1\n  AND {conditions}",
        select = capability.default_select.join(", "),
        tenant_col = capability.yacht_id_column,
        conditions = rendered.join(" AND "),
    );
    if let Some(order) = &capability.default_order {
        sql.push_str(&format!("\nORDER BY {order}"));
    }
    sql.push_str(&format!("\nLIMIT {limit}"));

    let wave = clauses.iter().map(|(_, op, _)| op.wave()).max().unwrap_or(Wave::Exact);
    Some(Probe {
        probe_id: format!("{table}-lookup"),
        table: table.to_string(),
        select_cols: capability.default_select.clone(),
        conjunction: Conjunction::And,
        wave,
        tier: 1,
        limit,
        order_by: capability.default_order.clone(),
        sql,
        params,
    })
}

/// Generate every statement for a plan, ordered by (tier, wave). Empty for
/// BLOCKED and UNKNOWN lanes.
pub fn generate_plan_sql(
    plan: &ExecutionPlan,
    registry: &CapabilityRegistry,
    config: &SearchConfig,
) -> Vec<GeneratedStatement> {
    use super::lane::Lane;
    if matches!(plan.lane.lane, Lane::Blocked | Lane::Unknown) {
        return Vec::new();
    }

    let mut statements = Vec::new();
    for batch in &plan.batches {
        for wave in &batch.wave_order {
            if let Some(stmt) = build_union_statement(plan, batch, *wave, registry, config) {
                statements.push(stmt);
            }
        }
    }
    statements
}
