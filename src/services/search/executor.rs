//! Probe execution.
//!
//! Tiers run sequentially; waves run in declared order inside a tier. Each
//! tier+wave first runs as one fused UNION-ALL statement; if that statement
//! fails outright, the wave falls back to per-table probes dispatched
//! concurrently under a semaphore, so a single broken table recovers
//! locally. The executor never builds SQL itself and rejects any probe or
//! statement whose first parameter is not the plan's tenant.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::SearchConfig;
use crate::services::database::{DbError, SearchDatabase};
use crate::utils::{ApiError, ApiResult};

use super::capability::CapabilityRegistry;
use super::operators::{ParamValue, Wave};
use super::planner::ExecutionPlan;
use super::sqlgen::{self, Probe};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Done,
    Error,
    BudgetExceeded,
    Cancelled,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeTrace {
    pub probe_id: String,
    pub table: String,
    pub wave: Wave,
    pub tier: u8,
    pub rows: usize,
    pub elapsed_ms: u64,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaveTrace {
    pub tier: u8,
    pub wave: Wave,
    pub tables: Vec<String>,
    pub rows_accumulated: usize,
    pub skipped: bool,
    /// "union" when the fused statement served the wave, "per_table" when
    /// it fell back to individual probes.
    pub strategy: &'static str,
}

/// A result row annotated with its origin before merging.
#[derive(Debug, Clone)]
pub struct SourcedRow {
    pub table: String,
    pub object_type: String,
    pub object_id: String,
    pub data: serde_json::Map<String, Value>,
}

#[derive(Debug, Default)]
pub struct ExecOutcome {
    pub rows: Vec<SourcedRow>,
    pub tables_hit: Vec<String>,
    pub waves_executed: usize,
    pub tiers_executed: usize,
    pub early_exit: bool,
    pub deadline_exceeded: bool,
    pub sql_queries_executed: usize,
    pub probe_traces: Vec<ProbeTrace>,
    pub wave_traces: Vec<WaveTrace>,
}

pub struct ProbeExecutor {
    db: Arc<dyn SearchDatabase>,
    registry: &'static CapabilityRegistry,
    config: SearchConfig,
}

impl ProbeExecutor {
    pub fn new(
        db: Arc<dyn SearchDatabase>,
        registry: &'static CapabilityRegistry,
        config: SearchConfig,
    ) -> Self {
        Self { db, registry, config }
    }

    /// Run the plan to completion, early exit, or deadline.
    pub async fn execute(&self, plan: &ExecutionPlan) -> ApiResult<ExecOutcome> {
        let started = Instant::now();
        let total_budget = Duration::from_millis(self.config.total_budget_ms);

        let mut outcome = ExecOutcome::default();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut tables_hit: HashSet<String> = HashSet::new();

        'tiers: for batch in &plan.batches {
            outcome.tiers_executed += 1;

            for wave in &batch.wave_order {
                let probes =
                    sqlgen::build_wave_probes(plan, batch, *wave, self.registry, &self.config);
                if probes.is_empty() {
                    continue;
                }

                self.enforce_tenant_invariant(plan, &probes)?;

                if probes.len() > self.config.queue_cap {
                    return Err(ApiError::Overloaded(format!(
                        "wave {} would queue {} probes (cap {})",
                        wave.label(),
                        probes.len(),
                        self.config.queue_cap
                    )));
                }

                let Some(statement) =
                    sqlgen::build_union_statement(plan, batch, *wave, self.registry, &self.config)
                else {
                    continue;
                };
                match statement.params.first() {
                    Some(ParamValue::Uuid(id)) if *id == plan.scope.yacht_id => {},
                    other => {
                        return Err(ApiError::TenantMismatch(format!(
                            "tier {} wave {} statement carries tenant {:?}, plan scope is {}",
                            batch.tier,
                            wave.label(),
                            other,
                            plan.scope.yacht_id
                        )));
                    },
                }

                // Distinct wave count, not per-tier increments.
                outcome.waves_executed = outcome.waves_executed.max(wave.as_index() + 1);

                let wave_budget = Duration::from_millis(self.config.wave_budget_ms(*wave));
                let plan_remaining = total_budget.saturating_sub(started.elapsed());
                let wave_deadline = wave_budget.min(plan_remaining);

                // Fused statement first; per-table fan-out only when the
                // whole statement errors out.
                let t0 = Instant::now();
                let union_result =
                    match timeout(wave_deadline, self.db.fetch_rows(&statement.sql, &statement.params))
                        .await
                    {
                        Err(_) => Err(WaveError::Deadline),
                        Ok(Err(DbError::Unsupported(msg))) => Err(WaveError::Unsupported(msg)),
                        Ok(Err(DbError::Query(msg))) => Err(WaveError::Failed(msg)),
                        Ok(Ok(rows)) => Ok(rows),
                    };
                outcome.sql_queries_executed += 1;
                let elapsed_ms = t0.elapsed().as_millis() as u64;
                let union_probe_id = format!("t{}-w{}-union", batch.tier, wave.as_index());
                let union_table = statement.tables.join("+");

                let (skipped, strategy) = match union_result {
                    Ok(rows) => {
                        let kept =
                            self.absorb(None, rows, &mut seen, &mut tables_hit, &mut outcome.rows);
                        outcome.probe_traces.push(ProbeTrace {
                            probe_id: union_probe_id,
                            table: union_table,
                            wave: *wave,
                            tier: batch.tier,
                            rows: kept,
                            elapsed_ms,
                            status: ProbeStatus::Done,
                            error: None,
                        });
                        (false, "union")
                    },
                    Err(WaveError::Unsupported(msg)) => {
                        // Operator not installed: the wave is a skip, not a
                        // failure, and the fallback would fail identically.
                        outcome.probe_traces.push(ProbeTrace {
                            probe_id: union_probe_id,
                            table: union_table,
                            wave: *wave,
                            tier: batch.tier,
                            rows: 0,
                            elapsed_ms,
                            status: ProbeStatus::Skipped,
                            error: Some(msg),
                        });
                        (true, "union")
                    },
                    Err(WaveError::Deadline) => {
                        outcome.probe_traces.push(ProbeTrace {
                            probe_id: union_probe_id,
                            table: union_table,
                            wave: *wave,
                            tier: batch.tier,
                            rows: 0,
                            elapsed_ms,
                            status: ProbeStatus::BudgetExceeded,
                            error: None,
                        });
                        (false, "union")
                    },
                    Err(WaveError::Cancelled) => (false, "union"),
                    Err(WaveError::Failed(msg)) => {
                        // The fused statement failed as a whole; rerun the
                        // wave per table so one broken table recovers
                        // locally instead of sinking its siblings.
                        tracing::debug!(
                            tier = batch.tier,
                            wave = wave.label(),
                            "union statement failed ({msg}); per-table fallback"
                        );
                        let fallback_deadline = wave_deadline.saturating_sub(t0.elapsed());
                        let (skipped, traces) = self
                            .run_wave(&probes, fallback_deadline, &mut seen, &mut tables_hit, &mut outcome)
                            .await;
                        outcome.probe_traces.extend(traces);
                        (skipped, "per_table")
                    },
                };

                outcome.wave_traces.push(WaveTrace {
                    tier: batch.tier,
                    wave: *wave,
                    tables: statement.tables,
                    rows_accumulated: outcome.rows.len(),
                    skipped,
                    strategy,
                });

                if outcome.rows.len() >= batch.exit.strong_hit_count {
                    outcome.early_exit = true;
                    tracing::debug!(
                        rows = outcome.rows.len(),
                        threshold = batch.exit.strong_hit_count,
                        "early exit after wave {}",
                        wave.label()
                    );
                    break 'tiers;
                }

                if started.elapsed() >= total_budget {
                    outcome.deadline_exceeded = true;
                    tracing::debug!("plan deadline exceeded after wave {}", wave.label());
                    break 'tiers;
                }
            }
        }

        outcome.tables_hit = tables_hit.into_iter().collect();
        outcome.tables_hit.sort();
        Ok(outcome)
    }

    /// Params[0] of every probe must be the plan's tenant. A mismatch is an
    /// invariant violation: abort the plan, return no rows.
    pub(crate) fn enforce_tenant_invariant(
        &self,
        plan: &ExecutionPlan,
        probes: &[Probe],
    ) -> ApiResult<()> {
        for probe in probes {
            match probe.params.first() {
                Some(ParamValue::Uuid(id)) if *id == plan.scope.yacht_id => {},
                other => {
                    return Err(ApiError::TenantMismatch(format!(
                        "probe {} carries tenant {:?}, plan scope is {}",
                        probe.probe_id, other, plan.scope.yacht_id
                    )));
                },
            }
        }
        Ok(())
    }

    async fn run_wave(
        &self,
        probes: &[Probe],
        wave_deadline: Duration,
        seen: &mut HashSet<(String, String)>,
        tables_hit: &mut HashSet<String>,
        outcome: &mut ExecOutcome,
    ) -> (bool, Vec<ProbeTrace>) {
        let semaphore = Arc::new(Semaphore::new(self.config.fan_out));
        let mut set: JoinSet<(Probe, u64, Result<Vec<serde_json::Map<String, Value>>, WaveError>)> =
            JoinSet::new();

        for probe in probes.iter().cloned() {
            let db = Arc::clone(&self.db);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (probe, 0, Err(WaveError::Cancelled));
                };
                let t0 = Instant::now();
                let result = match timeout(wave_deadline, db.fetch_rows(&probe.sql, &probe.params))
                    .await
                {
                    Err(_) => Err(WaveError::Deadline),
                    Ok(Err(DbError::Unsupported(msg))) => Err(WaveError::Unsupported(msg)),
                    Ok(Err(DbError::Query(msg))) => Err(WaveError::Failed(msg)),
                    Ok(Ok(rows)) => Ok(rows),
                };
                (probe, t0.elapsed().as_millis() as u64, result)
            });
        }

        let mut skipped = false;
        let mut traces = Vec::new();

        while let Some(joined) = set.join_next().await {
            let Ok((probe, elapsed_ms, result)) = joined else { continue };
            outcome.sql_queries_executed += 1;

            let (rows, status, error) = match result {
                Ok(rows) => {
                    let kept = self.absorb(
                        Some(&probe.table),
                        rows,
                        seen,
                        tables_hit,
                        &mut outcome.rows,
                    );
                    (kept, ProbeStatus::Done, None)
                },
                Err(WaveError::Unsupported(msg)) => {
                    // Operator not installed: the whole wave is a skip, not
                    // a failure. Remaining probes of the wave report the
                    // same way as they land.
                    skipped = true;
                    (0, ProbeStatus::Skipped, Some(msg))
                },
                Err(WaveError::Deadline) => (0, ProbeStatus::BudgetExceeded, None),
                Err(WaveError::Cancelled) => (0, ProbeStatus::Cancelled, None),
                Err(WaveError::Failed(msg)) => {
                    tracing::warn!(table = %probe.table, "probe failed: {msg}");
                    (0, ProbeStatus::Error, Some(msg))
                },
            };

            traces.push(ProbeTrace {
                probe_id: probe.probe_id,
                table: probe.table,
                wave: probe.wave,
                tier: probe.tier,
                rows,
                elapsed_ms,
                status,
                error,
            });
        }

        (skipped, traces)
    }

    /// Annotate and deduplicate a batch of raw rows into the result set,
    /// returning how many were kept.
    fn absorb(
        &self,
        fallback_table: Option<&str>,
        rows: Vec<serde_json::Map<String, Value>>,
        seen: &mut HashSet<(String, String)>,
        tables_hit: &mut HashSet<String>,
        out: &mut Vec<SourcedRow>,
    ) -> usize {
        let mut kept = 0;
        for row in rows {
            if let Some(sourced) = self.annotate(fallback_table, row) {
                let key = (sourced.table.clone(), sourced.object_id.clone());
                if seen.insert(key) {
                    tables_hit.insert(sourced.table.clone());
                    out.push(sourced);
                    kept += 1;
                }
            }
        }
        kept
    }

    /// Resolve the row's origin table (the `_source` marker for fused
    /// statements, the probe's table otherwise), object type and primary key.
    fn annotate(
        &self,
        fallback_table: Option<&str>,
        mut row: serde_json::Map<String, Value>,
    ) -> Option<SourcedRow> {
        let source = row
            .remove("_source")
            .and_then(|v| v.as_str().map(str::to_string))
            .or_else(|| fallback_table.map(str::to_string))?;
        let capability = self.registry.table(&source)?;
        let object_id = row
            .get(&capability.primary_key)
            .map(json_id)
            .unwrap_or_else(|| Value::Object(row.clone()).to_string());
        Some(SourcedRow {
            table: source,
            object_type: capability.object_type.clone(),
            object_id,
            data: row,
        })
    }
}

fn json_id(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

enum WaveError {
    Unsupported(String),
    Failed(String),
    Deadline,
    Cancelled,
}
