//! Trace configuration.
//!
//! The recurrence itself is parameter-free. The only knob is how much of a run
//! callers record, set via the `ADAHEDGE_TRACE` environment variable:
//! - `off` (default): outputs only.
//! - `summary`: one record per run (final gap, regret, digest).
//! - `steps`: one record per timestep (rate, mix losses, gap).

use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted by [`trace_level`].
pub const TRACE_ENV: &str = "ADAHEDGE_TRACE";

/// How much diagnostic detail a caller should record for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TraceLevel {
    #[default]
    Off,
    Summary,
    Steps,
}

impl TraceLevel {
    /// Parse from string (case-insensitive). Unknown values map to `Off`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" | "run" | "1" => Self::Summary,
            "steps" | "step" | "full" | "2" => Self::Steps,
            _ => Self::Off,
        }
    }

    /// Returns true if per-run summaries should be recorded.
    #[must_use]
    pub const fn records_summary(self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Returns true if per-step traces should be recorded.
    #[must_use]
    pub const fn records_steps(self) -> bool {
        matches!(self, Self::Steps)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Summary => "summary",
            Self::Steps => "steps",
        }
    }
}

// 0=unresolved, 1=Off, 2=Summary, 3=Steps.
static CACHED_LEVEL: AtomicU8 = AtomicU8::new(0);

const LEVEL_UNRESOLVED: u8 = 0;
const LEVEL_OFF: u8 = 1;
const LEVEL_SUMMARY: u8 = 2;
const LEVEL_STEPS: u8 = 3;

fn level_to_u8(level: TraceLevel) -> u8 {
    match level {
        TraceLevel::Off => LEVEL_OFF,
        TraceLevel::Summary => LEVEL_SUMMARY,
        TraceLevel::Steps => LEVEL_STEPS,
    }
}

fn u8_to_level(v: u8) -> TraceLevel {
    match v {
        LEVEL_SUMMARY => TraceLevel::Summary,
        LEVEL_STEPS => TraceLevel::Steps,
        _ => TraceLevel::Off,
    }
}

/// Get the configured trace level (reads the env var on first call, caches thereafter).
#[must_use]
pub fn trace_level() -> TraceLevel {
    let cached = CACHED_LEVEL.load(Ordering::Relaxed);
    if cached != LEVEL_UNRESOLVED {
        return u8_to_level(cached);
    }

    let level = std::env::var(TRACE_ENV)
        .map(|v| TraceLevel::from_str_loose(&v))
        .unwrap_or_default();
    // Racing resolvers read the same environment, so last-writer-wins is fine.
    CACHED_LEVEL.store(level_to_u8(level), Ordering::Release);
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trace_levels() {
        assert_eq!(TraceLevel::from_str_loose("off"), TraceLevel::Off);
        assert_eq!(TraceLevel::from_str_loose("SUMMARY"), TraceLevel::Summary);
        assert_eq!(TraceLevel::from_str_loose(" run "), TraceLevel::Summary);
        assert_eq!(TraceLevel::from_str_loose("steps"), TraceLevel::Steps);
        assert_eq!(TraceLevel::from_str_loose("Full"), TraceLevel::Steps);
        assert_eq!(TraceLevel::from_str_loose("2"), TraceLevel::Steps);
        assert_eq!(TraceLevel::from_str_loose("verbose"), TraceLevel::Off);
        assert_eq!(TraceLevel::from_str_loose(""), TraceLevel::Off);
    }

    #[test]
    fn level_predicates_nest() {
        assert!(!TraceLevel::Off.records_summary());
        assert!(TraceLevel::Summary.records_summary());
        assert!(!TraceLevel::Summary.records_steps());
        assert!(TraceLevel::Steps.records_summary());
        assert!(TraceLevel::Steps.records_steps());
    }

    #[test]
    fn u8_roundtrip_covers_every_level() {
        for level in [TraceLevel::Off, TraceLevel::Summary, TraceLevel::Steps] {
            assert_eq!(u8_to_level(level_to_u8(level)), level);
        }
        assert_eq!(u8_to_level(LEVEL_UNRESOLVED), TraceLevel::Off);
    }

    #[test]
    fn trace_level_is_stable_across_calls() {
        assert_eq!(trace_level(), trace_level());
    }
}
