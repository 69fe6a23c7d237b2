//! Single-table runs with trace-level-controlled logging.

use std::io::Write;
use std::time::Instant;

use adahedge_core::{Forecast, LossTable, TraceLevel, forecast, forecast_traced};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

const GATE: &str = "run";

/// Serializable outputs of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub experts: usize,
    pub horizon: usize,
    /// `T × K` weight rows.
    pub weights: Vec<Vec<f64>>,
    pub incurred: Vec<f64>,
    pub mixability_gap: f64,
    pub learner_loss: f64,
    pub regret: f64,
    pub best_expert: Option<usize>,
    /// Hex BLAKE3 digest of the exact outputs.
    pub digest: String,
}

impl RunOutput {
    #[must_use]
    pub fn from_forecast(run: &Forecast) -> Self {
        Self {
            experts: run.experts(),
            horizon: run.horizon(),
            weights: run.weight_rows().map(<[f64]>::to_vec).collect(),
            incurred: run.incurred().to_vec(),
            mixability_gap: run.mixability_gap(),
            learner_loss: run.learner_loss(),
            regret: run.regret(),
            best_expert: run.best_expert().map(|(k, _)| k),
            digest: run.digest_hex(),
        }
    }
}

/// Forecast `table`, logging at the granularity `level` asks for.
///
/// Shape errors are logged before being returned.
pub fn run_table<W: Write>(
    table: &LossTable,
    case: &str,
    level: TraceLevel,
    emitter: &mut LogEmitter<W>,
) -> Result<Forecast, HarnessError> {
    let started = Instant::now();
    if level.records_summary() {
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "forecast.start")
                .with_gate(GATE)
                .with_case(case)
                .with_shape(table.horizon(), table.experts())
                .with_details(serde_json::json!({ "trace_level": level.as_str() })),
        )?;
    }

    let result = if level.records_steps() {
        forecast_traced(table).map(|(run, steps)| (run, Some(steps)))
    } else {
        forecast(table).map(|run| (run, None))
    };

    let (run, steps) = match result {
        Ok(ok) => ok,
        Err(err) => {
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Error, "forecast.invalid_shape")
                    .with_gate(GATE)
                    .with_case(case)
                    .with_shape(table.horizon(), table.experts())
                    .with_outcome(Outcome::Error)
                    .with_details(serde_json::json!({ "error": err.to_string() })),
            )?;
            return Err(err.into());
        }
    };

    for step in steps.iter().flatten() {
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Debug, "forecast.step")
                .with_gate(GATE)
                .with_case(case)
                .with_step(step.step, step.learning_rate, step.cumulative_gap)
                .with_details(serde_json::json!({
                    "incurred": step.incurred,
                    "mix_loss_before": step.mix_loss_before,
                    "mix_loss_after": step.mix_loss_after,
                    "gap": step.gap,
                })),
        )?;
    }

    if level.records_summary() {
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "forecast.finish")
                .with_gate(GATE)
                .with_case(case)
                .with_shape(run.horizon(), run.experts())
                .with_mixability_gap(run.mixability_gap())
                .with_outcome(Outcome::Pass)
                .with_duration_ms(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
                .with_details(serde_json::json!({
                    "learner_loss": run.learner_loss(),
                    "regret": run.regret(),
                    "digest": run.digest_hex(),
                })),
        )?;
    }

    Ok(run)
}
