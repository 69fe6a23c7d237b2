//! Determinism and invariant regression gate.
//!
//! Every scenario is forecast twice with fresh learners and once through the
//! streaming API. All three must agree bit for bit, and the batch run must
//! satisfy the forecaster's invariants:
//! - each weight row is a probability distribution
//! - weights, incurred losses and the gap are finite
//! - each incurred loss lies between that step's extreme expert losses
//! - the per-step gap is non-negative and `Delta` never decreases
//! - regret stays below `2 * Delta`
//!
//! Inputs are the fixture tables plus a seeded generator, so the gate never
//! depends on wall-clock time or ambient randomness.

use std::io::Write;
use std::path::Path;

use adahedge_core::{AdaHedge, Forecast, LossTable, StepTrace, forecast, forecast_traced};
use serde::Serialize;

use crate::error::HarnessError;
use crate::fixtures::{Expected, FixtureSet};
use crate::structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome};

const GATE: &str = "determinism";
const RUN_ID: &str = "determinism";

/// Seed of the generated scenario set.
pub const SEED: u64 = 0xADA_4ED6E;

const TOL: f64 = 1e-9;

struct Shape {
    name: &'static str,
    experts: usize,
    steps: usize,
    magnitude: f64,
    /// Draw losses from `{0, magnitude}` to provoke ties.
    binary: bool,
}

const GENERATED: &[Shape] = &[
    Shape {
        name: "uniform_k2",
        experts: 2,
        steps: 64,
        magnitude: 1.0,
        binary: false,
    },
    Shape {
        name: "uniform_k5",
        experts: 5,
        steps: 256,
        magnitude: 1.0,
        binary: false,
    },
    Shape {
        name: "binary_k3",
        experts: 3,
        steps: 200,
        magnitude: 1.0,
        binary: true,
    },
    Shape {
        name: "signed_k4",
        experts: 4,
        steps: 128,
        magnitude: 25.0,
        binary: false,
    },
    Shape {
        name: "wide_k16",
        experts: 16,
        steps: 96,
        magnitude: 1.0,
        binary: false,
    },
    Shape {
        name: "large_k3",
        experts: 3,
        steps: 64,
        magnitude: 1.0e6,
        binary: false,
    },
];

/// A named loss table the gate runs.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub table: LossTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckResult {
    pub invariant_id: &'static str,
    pub ok: bool,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub experts: usize,
    pub horizon: usize,
    pub digest: String,
    pub rerun_digest_equal: bool,
    pub streaming_matches_batch: bool,
    pub invariant_checks: Vec<InvariantCheckResult>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeterminismSummary {
    pub scenarios: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeterminismReport {
    pub schema_version: &'static str,
    pub generated_at: String,
    pub seed: u64,
    pub summary: DeterminismSummary,
    pub scenarios: Vec<ScenarioResult>,
}

impl DeterminismReport {
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.summary.failed == 0
    }
}

/// Seeded scenarios covering several shapes and loss regimes.
#[must_use]
pub fn generated_scenarios(seed: u64) -> Vec<Scenario> {
    let mut rng = seed;
    GENERATED
        .iter()
        .map(|shape| {
            let values = (0..shape.experts * shape.steps)
                .map(|_| {
                    let u = unit(next_u64(&mut rng));
                    if shape.binary {
                        if u < 0.5 { 0.0 } else { shape.magnitude }
                    } else {
                        (2.0 * u - 1.0) * shape.magnitude
                    }
                })
                .collect();
            Scenario {
                name: format!("generated/{}", shape.name),
                table: LossTable::from_flat(values, shape.experts)
                    .unwrap_or_else(|_| LossTable::empty(shape.experts)),
            }
        })
        .collect()
}

/// Every fixture case expected to succeed, as a scenario.
#[must_use]
pub fn fixture_scenarios(set: &FixtureSet) -> Vec<Scenario> {
    set.cases
        .iter()
        .filter(|case| matches!(case.expected, Expected::Forecast { .. }))
        .filter_map(|case| {
            case.loss_table().ok().map(|table| Scenario {
                name: format!("fixture/{}", case.name),
                table,
            })
        })
        .collect()
}

/// Run the gate over `scenarios`, logging one record per scenario.
pub fn run_gate<W: Write>(
    scenarios: &[Scenario],
    emitter: &mut LogEmitter<W>,
) -> Result<DeterminismReport, HarnessError> {
    let mut results = Vec::with_capacity(scenarios.len());
    for scenario in scenarios {
        let result = run_scenario(scenario)?;
        let ok = result.failures.is_empty();
        emitter.emit_entry(
            LogEntry::new(
                "",
                if ok { LogLevel::Info } else { LogLevel::Error },
                "determinism.scenario",
            )
            .with_gate(GATE)
            .with_case(&result.name)
            .with_shape(result.horizon, result.experts)
            .with_outcome(Outcome::from_ok(ok))
            .with_details(serde_json::json!({
                "digest": result.digest,
                "rerun_digest_equal": result.rerun_digest_equal,
                "streaming_matches_batch": result.streaming_matches_batch,
                "failures": result.failures,
            })),
        )?;
        results.push(result);
    }

    let passed = results.iter().filter(|r| r.failures.is_empty()).count();
    let summary = DeterminismSummary {
        scenarios: results.len(),
        passed,
        failed: results.len() - passed,
    };
    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "determinism.summary")
            .with_gate(GATE)
            .with_outcome(Outcome::from_ok(summary.failed == 0))
            .with_details(serde_json::json!({
                "scenarios": summary.scenarios,
                "passed": summary.passed,
                "failed": summary.failed,
            })),
    )?;

    Ok(DeterminismReport {
        schema_version: "v1",
        generated_at: LogEntry::new("adahedge::gen::000", LogLevel::Info, "generated").timestamp,
        seed: SEED,
        summary,
        scenarios: results,
    })
}

/// Run the gate over the fixture set plus generated scenarios, writing the
/// JSONL log, the JSON report and an artifact index beside the report.
pub fn run_and_write(
    fixtures: &FixtureSet,
    log_path: &Path,
    report_path: &Path,
) -> Result<DeterminismReport, HarnessError> {
    for path in [log_path, report_path] {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut scenarios = fixture_scenarios(fixtures);
    scenarios.extend(generated_scenarios(SEED));

    let mut emitter = LogEmitter::to_file(log_path, RUN_ID)?;
    let report = run_gate(&scenarios, &mut emitter)?;
    std::fs::write(report_path, serde_json::to_string_pretty(&report)?)?;

    let index_path = report_path.with_extension("artifacts.json");
    let mut index = ArtifactIndex::new(RUN_ID);
    index.add_file(report_path, "determinism_report")?;
    std::fs::write(&index_path, index.to_json()?)?;

    emitter.emit_entry(
        LogEntry::new("", LogLevel::Info, "determinism.artifacts")
            .with_gate(GATE)
            .with_artifacts(vec![
                report_path.display().to_string(),
                index_path.display().to_string(),
            ]),
    )?;
    emitter.flush()?;
    Ok(report)
}

fn run_scenario(scenario: &Scenario) -> Result<ScenarioResult, HarnessError> {
    let table = &scenario.table;
    let mut failures = Vec::new();

    let (run, traces) = forecast_traced(table)?;
    let rerun = forecast(table)?;
    let rerun_digest_equal = run.digest() == rerun.digest();
    if !rerun_digest_equal {
        failures.push("rerun digest differs from first run".to_string());
    }

    let streaming_matches_batch = streaming_matches(table, &run)?;
    if !streaming_matches_batch {
        failures.push("streaming outputs differ from batch outputs".to_string());
    }

    let invariant_checks = check_invariants(table, &run, &traces);
    for check in &invariant_checks {
        if !check.ok {
            failures.push(format!("{} violated", check.invariant_id));
        }
    }

    Ok(ScenarioResult {
        name: scenario.name.clone(),
        experts: run.experts(),
        horizon: run.horizon(),
        digest: run.digest_hex(),
        rerun_digest_equal,
        streaming_matches_batch,
        invariant_checks,
        failures,
    })
}

fn streaming_matches(table: &LossTable, batch: &Forecast) -> Result<bool, HarnessError> {
    let mut learner = AdaHedge::new(table.experts())?;
    for (t, row) in table.rows().enumerate() {
        let trace = learner.observe(row)?;
        if !bits_eq(learner.last_played(), batch.weight_row(t))
            || trace.incurred.to_bits() != batch.incurred()[t].to_bits()
        {
            return Ok(false);
        }
    }
    Ok(learner.mixability_gap().to_bits() == batch.mixability_gap().to_bits())
}

fn bits_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

fn scale(values: &[f64]) -> f64 {
    values.iter().fold(1.0_f64, |m, v| m.max(v.abs()))
}

fn check(invariant_id: &'static str, failures: Vec<String>) -> InvariantCheckResult {
    InvariantCheckResult {
        invariant_id,
        ok: failures.is_empty(),
        failures,
    }
}

fn check_invariants(
    table: &LossTable,
    run: &Forecast,
    traces: &[StepTrace],
) -> Vec<InvariantCheckResult> {
    let mut out = Vec::with_capacity(5);

    let mut bad = Vec::new();
    for (t, row) in run.weight_rows().enumerate() {
        let sum: f64 = row.iter().sum();
        if (sum - 1.0).abs() > TOL {
            bad.push(format!("row {t} sums to {sum}"));
        }
        if let Some(w) = row.iter().find(|w| !(0.0..=1.0).contains(*w)) {
            bad.push(format!("row {t} has weight {w} outside [0, 1]"));
        }
    }
    out.push(check("weights.rows_are_distributions", bad));

    let mut bad = Vec::new();
    if let Some(w) = run.weights().iter().find(|w| !w.is_finite()) {
        bad.push(format!("non-finite weight {w}"));
    }
    if let Some(h) = run.incurred().iter().find(|h| !h.is_finite()) {
        bad.push(format!("non-finite incurred loss {h}"));
    }
    if !run.mixability_gap().is_finite() {
        bad.push(format!("non-finite gap {}", run.mixability_gap()));
    }
    out.push(check("outputs.finite", bad));

    let mut bad = Vec::new();
    for (t, (row, h)) in table.rows().zip(run.incurred()).enumerate() {
        let lo = row.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let slack = TOL * scale(row);
        if *h < lo - slack || *h > hi + slack {
            bad.push(format!("step {t}: incurred {h} outside [{lo}, {hi}]"));
        }
    }
    out.push(check("incurred.within_row_bounds", bad));

    let mut bad = Vec::new();
    let mut prev = 0.0;
    for trace in traces {
        if trace.gap < 0.0 {
            bad.push(format!("step {}: negative gap {}", trace.step, trace.gap));
        }
        if trace.cumulative_gap < prev {
            bad.push(format!(
                "step {}: gap decreased {prev} -> {}",
                trace.step, trace.cumulative_gap
            ));
        }
        prev = trace.cumulative_gap;
    }
    out.push(check("gap.monotone", bad));

    let mut bad = Vec::new();
    let bound = 2.0 * run.mixability_gap() + TOL * (1.0 + scale(run.cumulative_losses()));
    if run.regret() > bound {
        bad.push(format!(
            "regret {} exceeds 2 * gap {}",
            run.regret(),
            run.mixability_gap()
        ));
    }
    out.push(check("regret.bounded_by_twice_gap", bad));

    out
}

fn next_u64(state: &mut u64) -> u64 {
    // PCG-style LCG; deterministic and cheap.
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state
}

/// Top 53 bits of `r` as a float in `[0, 1)`.
fn unit(r: u64) -> f64 {
    (r >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structured_log::validate_log_str;

    #[test]
    fn generated_scenarios_are_reproducible() {
        let a = generated_scenarios(SEED);
        let b = generated_scenarios(SEED);
        assert_eq!(a.len(), GENERATED.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.table, y.table);
        }
        let other = generated_scenarios(SEED ^ 1);
        assert_ne!(a[0].table, other[0].table);
    }

    #[test]
    fn generated_shapes_match_declarations() {
        for (scenario, shape) in generated_scenarios(7).iter().zip(GENERATED) {
            assert_eq!(scenario.table.experts(), shape.experts);
            assert_eq!(scenario.table.horizon(), shape.steps);
            for v in scenario.table.as_flat() {
                assert!(v.abs() <= shape.magnitude);
            }
        }
    }

    #[test]
    fn gate_passes_on_generated_set() {
        let mut emitter = LogEmitter::to_buffer("unit");
        let report = run_gate(&generated_scenarios(SEED), &mut emitter).unwrap();
        assert!(report.all_passed(), "{:#?}", report.scenarios);
        assert_eq!(report.summary.scenarios, GENERATED.len());
        for s in &report.scenarios {
            assert!(s.rerun_digest_equal);
            assert!(s.streaming_matches_batch);
            assert_eq!(s.invariant_checks.len(), 5);
        }
        assert_eq!(validate_log_str(emitter.contents()), Ok(GENERATED.len() + 1));
    }

    #[test]
    fn invariant_checker_flags_a_bad_forecast() {
        let table = LossTable::from_rows(&[[0.0, 1.0], [1.0, 0.0]]).unwrap();
        let (run, mut traces) = forecast_traced(&table).unwrap();
        traces[1].cumulative_gap = -1.0;
        let checks = check_invariants(&table, &run, &traces);
        let gap = checks.iter().find(|c| c.invariant_id == "gap.monotone").unwrap();
        assert!(!gap.ok);
        assert!(checks.iter().filter(|c| c.invariant_id != "gap.monotone").all(|c| c.ok));
    }

    #[test]
    fn fixture_scenarios_skip_error_cases() {
        let set = FixtureSet::from_json(
            r#"{"version":"v1","family":"adahedge","cases":[
                {"name":"ok","experts":2,"losses":[[0.0,1.0]],"expected":{"weights":[[0.5,0.5]],"incurred":[0.5],"mixability_gap":0.5}},
                {"name":"bad","experts":1,"losses":[[1.0]],"expected":{"error":"invalid_shape"}}
            ]}"#,
        )
        .unwrap();
        let scenarios = fixture_scenarios(&set);
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].name, "fixture/ok");
    }

    #[test]
    fn unit_interval_bounds() {
        assert_eq!(unit(0), 0.0);
        assert!(unit(u64::MAX) < 1.0);
    }
}
