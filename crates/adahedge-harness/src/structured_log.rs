//! Structured JSONL logging for forecasting runs and harness gates.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL record with required + optional fields.
//! - [`LogEmitter`]: writes JSONL lines with sequential trace ids.
//! - [`ArtifactIndex`]: links logs to written artifacts with SHA-256 integrity.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use adahedge_core::LearningRate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Check/verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
    Error,
}

impl Outcome {
    #[must_use]
    pub const fn from_ok(ok: bool) -> Self {
        if ok { Self::Pass } else { Self::Fail }
    }
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Harness gate name (e.g. `verify`, `determinism`, `run`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    /// Fixture case or scenario name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon: Option<usize>,
    /// Zero-based timestep for per-step records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    /// Learning rate: a number, or `"inf"` in the Follow-The-Leader regime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixability_gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            gate: None,
            case: None,
            experts: None,
            horizon: None,
            step: None,
            learning_rate: None,
            mixability_gap: None,
            outcome: None,
            duration_ms: None,
            artifact_refs: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_gate(mut self, gate: impl Into<String>) -> Self {
        self.gate = Some(gate.into());
        self
    }

    #[must_use]
    pub fn with_case(mut self, case: impl Into<String>) -> Self {
        self.case = Some(case.into());
        self
    }

    /// Set the `(T, K)` shape of the loss table.
    #[must_use]
    pub fn with_shape(mut self, horizon: usize, experts: usize) -> Self {
        self.horizon = Some(horizon);
        self.experts = Some(experts);
        self
    }

    /// Set per-step recurrence state.
    #[must_use]
    pub fn with_step(mut self, step: usize, rate: LearningRate, mixability_gap: f64) -> Self {
        self.step = Some(step);
        self.learning_rate = Some(rate_value(rate));
        self.mixability_gap = Some(mixability_gap);
        self
    }

    #[must_use]
    pub fn with_mixability_gap(mut self, gap: f64) -> Self {
        self.mixability_gap = Some(gap);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_artifacts(mut self, refs: Vec<String>) -> Self {
        self.artifact_refs = Some(refs);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JSON encoding of a learning rate. JSON has no infinity, so FTL is `"inf"`.
#[must_use]
pub fn rate_value(rate: LearningRate) -> serde_json::Value {
    match rate {
        LearningRate::Finite(eta) => serde_json::json!(eta),
        LearningRate::Infinite => serde_json::Value::String("inf".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

/// A single artifact entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Artifact index linking logs to written reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hash a file on disk and add it to the index.
    pub fn add_file(&mut self, path: &Path, kind: impl Into<String>) -> std::io::Result<&mut Self> {
        let bytes = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.into(),
            sha256: sha256_hex(&bytes),
            size_bytes: Some(bytes.len() as u64),
        });
        Ok(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries to any writer.
pub struct LogEmitter<W: Write> {
    writer: W,
    seq: u64,
    run_id: String,
}

impl LogEmitter<BufWriter<File>> {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file), run_id))
    }
}

impl LogEmitter<Vec<u8>> {
    /// Create an emitter that writes to an in-memory buffer.
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self::new(Vec::new(), run_id)
    }

    /// Emitted JSONL so far.
    #[must_use]
    pub fn contents(&self) -> &str {
        std::str::from_utf8(&self.writer).unwrap_or_default()
    }
}

impl LogEmitter<std::io::Stderr> {
    #[must_use]
    pub fn to_stderr(run_id: &str) -> Self {
        Self::new(std::io::stderr(), run_id)
    }
}

impl<W: Write> LogEmitter<W> {
    pub fn new(writer: W, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("adahedge::{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a bare entry with auto-generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let mut entry = LogEntry::new(trace_id, level, event);
        entry.run_id = Some(self.run_id.clone());
        self.emit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Emit a fully-populated entry, filling in trace id and run id when absent.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn field_error(line_number: usize, field: &str, message: String) -> LogValidationError {
    LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| vec![field_error(line_number, "<json>", format!("invalid JSON: {e}"))])?;

    let Some(obj) = value.as_object() else {
        return Err(vec![field_error(
            line_number,
            "<root>",
            "expected JSON object".to_string(),
        )]);
    };

    let mut errors = Vec::new();

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(field_error(
                line_number,
                field,
                "required field missing".to_string(),
            ));
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error"].contains(&level)
    {
        errors.push(field_error(
            line_number,
            "level",
            format!("invalid level: '{level}'"),
        ));
    }

    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !["pass", "fail", "skip", "error"].contains(&outcome)
    {
        errors.push(field_error(
            line_number,
            "outcome",
            format!("invalid outcome: '{outcome}'"),
        ));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(field_error(
            line_number,
            "trace_id",
            format!("trace_id must be '::'-namespaced: '{trace_id}'"),
        ));
    }

    // Step records carry the recurrence state they describe.
    if obj.contains_key("step") {
        let rate_ok = match obj.get("learning_rate") {
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|eta| eta >= 0.0),
            Some(serde_json::Value::String(s)) => s == "inf",
            _ => false,
        };
        if !rate_ok {
            errors.push(field_error(
                line_number,
                "learning_rate",
                "step records need a non-negative learning_rate or \"inf\"".to_string(),
            ));
        }
        match obj.get("mixability_gap").and_then(serde_json::Value::as_f64) {
            Some(gap) if gap >= 0.0 => {}
            _ => errors.push(field_error(
                line_number,
                "mixability_gap",
                "step records need a non-negative mixability_gap".to_string(),
            )),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value(value)
        .map_err(|e| vec![field_error(line_number, "<schema>", e.to_string())])
}

/// Validate every non-empty line of a JSONL file.
///
/// Returns the number of valid lines, or every error found.
pub fn validate_log_file(path: &Path) -> Result<usize, Vec<LogValidationError>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| vec![field_error(0, "<file>", format!("cannot read: {e}"))])?;
    validate_log_str(&content)
}

/// Validate JSONL content held in memory.
pub fn validate_log_str(content: &str) -> Result<usize, Vec<LogValidationError>> {
    let mut errors = Vec::new();
    let mut valid = 0usize;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match validate_log_line(line, idx + 1) {
            Ok(_) => valid += 1,
            Err(mut e) => errors.append(&mut e),
        }
    }
    if errors.is_empty() {
        Ok(valid)
    } else {
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

/// RFC 3339 UTC timestamp for `secs` since the Unix epoch.
fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    // Civil-from-days (proleptic Gregorian), H. Hinnant.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields_only() {
        let entry = LogEntry::new("adahedge::run-1::001", LogLevel::Info, "forecast.start");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "adahedge::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "forecast.start");
        assert!(parsed.get("gate").is_none());
        assert!(parsed.get("step").is_none());
        assert!(parsed.get("learning_rate").is_none());
    }

    #[test]
    fn infinite_rate_serializes_as_string() {
        let entry = LogEntry::new("a::b", LogLevel::Debug, "forecast.step").with_step(
            0,
            LearningRate::Infinite,
            0.0,
        );
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["learning_rate"], "inf");
        assert_eq!(parsed["step"], 0);

        let finite = LogEntry::new("a::b", LogLevel::Debug, "forecast.step").with_step(
            3,
            LearningRate::Finite(0.25),
            2.0,
        );
        let parsed: serde_json::Value = serde_json::from_str(&finite.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["learning_rate"], 0.25);
        assert_eq!(parsed["mixability_gap"], 2.0);
    }

    #[test]
    fn emitter_assigns_sequential_trace_ids() {
        let mut emitter = LogEmitter::to_buffer("unit");
        emitter.emit(LogLevel::Info, "first").unwrap();
        emitter
            .emit_entry(LogEntry::new("", LogLevel::Warn, "second").with_gate("verify"))
            .unwrap();
        let lines: Vec<&str> = emitter.contents().lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["trace_id"], "adahedge::unit::001");
        assert_eq!(second["trace_id"], "adahedge::unit::002");
        assert_eq!(second["run_id"], "unit");
        assert_eq!(second["gate"], "verify");
        assert_eq!(validate_log_str(emitter.contents()), Ok(2));
    }

    #[test]
    fn validation_catches_missing_and_invalid_fields() {
        let errs = validate_log_line(r#"{"trace_id":"x::y","level":"loud"}"#, 7).unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"timestamp"));
        assert!(fields.contains(&"event"));
        assert!(fields.contains(&"level"));
        assert!(errs.iter().all(|e| e.line_number == 7));

        let errs = validate_log_line(
            r#"{"timestamp":"t","trace_id":"flat","level":"info","event":"e"}"#,
            1,
        )
        .unwrap_err();
        assert_eq!(errs[0].field, "trace_id");

        assert!(validate_log_line("not json", 1).is_err());
        assert!(validate_log_line("[1,2]", 1).is_err());
    }

    #[test]
    fn step_records_need_rate_and_gap() {
        let bad = r#"{"timestamp":"t","trace_id":"a::b","level":"debug","event":"forecast.step","step":2,"learning_rate":-1.0}"#;
        let errs = validate_log_line(bad, 1).unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["learning_rate", "mixability_gap"]);

        let good = r#"{"timestamp":"t","trace_id":"a::b","level":"debug","event":"forecast.step","step":2,"learning_rate":"inf","mixability_gap":0.0}"#;
        assert!(validate_log_line(good, 1).is_ok());
    }

    #[test]
    fn format_utc_known_instants() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_700_000_000, 123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
