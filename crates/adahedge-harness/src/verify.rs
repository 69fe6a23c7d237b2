//! Fixture verification against reference outputs.

use adahedge_core::{Forecast, InvalidShape, forecast};
use serde::{Deserialize, Serialize};

use crate::fixtures::{Expected, FixtureCase, FixtureSet};

/// Relative tolerance for every compared value.
pub const TOLERANCE: f64 = 1e-9;

/// `|actual - expected| <= TOLERANCE * max(1, |expected|)`. NaN never matches.
#[must_use]
pub fn within_tolerance(expected: f64, actual: f64) -> bool {
    (actual - expected).abs() <= TOLERANCE * expected.abs().max(1.0)
}

/// Result of verifying a single fixture case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub passed: bool,
    /// First mismatch, if any.
    pub detail: Option<String>,
    /// Largest absolute deviation over all compared values.
    pub max_abs_error: f64,
    /// Output digest of successful runs.
    pub digest: Option<String>,
}

/// Aggregate verification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub family: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl VerificationReport {
    #[must_use]
    pub fn from_results(family: impl Into<String>, results: Vec<CaseResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            family: family.into(),
            total,
            passed,
            failed: total - passed,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Fixture verification: {}\n\n", self.family));
        out.push_str(&format!("- Total: {}\n", self.total));
        out.push_str(&format!("- Passed: {}\n", self.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.failed));

        out.push_str("| Case | Status | Max abs error | Detail |\n");
        out.push_str("|------|--------|---------------|--------|\n");
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {:.3e} | {} |\n",
                r.name,
                status,
                r.max_abs_error,
                r.detail.as_deref().unwrap_or("")
            ));
        }
        out
    }
}

/// Run every case of `set` and compare against its expected outcome.
#[must_use]
pub fn verify_fixture_set(set: &FixtureSet) -> VerificationReport {
    let results = set.cases.iter().map(verify_case).collect();
    VerificationReport::from_results(set.family.clone(), results)
}

/// Verify one case.
#[must_use]
pub fn verify_case(case: &FixtureCase) -> CaseResult {
    let outcome: Result<Forecast, InvalidShape> = case.loss_table().and_then(|t| forecast(&t));
    let mut result = CaseResult {
        name: case.name.clone(),
        passed: false,
        detail: None,
        max_abs_error: 0.0,
        digest: outcome.as_ref().ok().map(Forecast::digest_hex),
    };

    match (&case.expected, outcome) {
        (Expected::Error { error }, Err(_)) if error == "invalid_shape" => result.passed = true,
        (Expected::Error { error }, Err(err)) => {
            result.detail = Some(format!("expected error '{error}', got invalid_shape ({err})"));
        }
        (Expected::Error { error }, Ok(_)) => {
            result.detail = Some(format!("expected error '{error}', run succeeded"));
        }
        (Expected::Forecast { .. }, Err(err)) => {
            result.detail = Some(format!("unexpected error: {err}"));
        }
        (
            Expected::Forecast {
                weights,
                incurred,
                mixability_gap,
            },
            Ok(run),
        ) => {
            let mut cmp = Comparison::default();
            cmp.lengths("weight rows", weights.len(), run.horizon());
            for (t, (want, got)) in weights.iter().zip(run.weight_rows()).enumerate() {
                cmp.lengths(&format!("weights[{t}]"), want.len(), got.len());
                for (k, (e, a)) in want.iter().zip(got).enumerate() {
                    cmp.value(&format!("weights[{t}][{k}]"), *e, *a);
                }
            }
            cmp.lengths("incurred", incurred.len(), run.incurred().len());
            for (t, (e, a)) in incurred.iter().zip(run.incurred()).enumerate() {
                cmp.value(&format!("incurred[{t}]"), *e, *a);
            }
            cmp.value("mixability_gap", *mixability_gap, run.mixability_gap());

            result.passed = cmp.first_mismatch.is_none();
            result.detail = cmp.first_mismatch;
            result.max_abs_error = cmp.max_abs_error;
        }
    }
    result
}

#[derive(Default)]
struct Comparison {
    first_mismatch: Option<String>,
    max_abs_error: f64,
}

impl Comparison {
    fn lengths(&mut self, what: &str, expected: usize, actual: usize) {
        if expected != actual && self.first_mismatch.is_none() {
            self.first_mismatch = Some(format!("{what}: expected length {expected}, got {actual}"));
        }
    }

    fn value(&mut self, what: &str, expected: f64, actual: f64) {
        let err = (actual - expected).abs();
        if err.is_nan() {
            self.max_abs_error = f64::NAN;
        } else if !self.max_abs_error.is_nan() {
            self.max_abs_error = self.max_abs_error.max(err);
        }
        if !within_tolerance(expected, actual) && self.first_mismatch.is_none() {
            self.first_mismatch = Some(format!("{what}: expected {expected}, got {actual}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(expected_gap: f64) -> FixtureSet {
        FixtureSet::from_json(&format!(
            r#"{{
                "version": "v1",
                "family": "adahedge",
                "cases": [
                    {{
                        "name": "first_step",
                        "experts": 2,
                        "losses": [[0.0, 1.0]],
                        "expected": {{"weights": [[0.5, 0.5]], "incurred": [0.5], "mixability_gap": {expected_gap}}}
                    }},
                    {{
                        "name": "single",
                        "experts": 1,
                        "losses": [[1.0]],
                        "expected": {{"error": "invalid_shape"}}
                    }}
                ]
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn tolerance_is_relative_above_one() {
        assert!(within_tolerance(1e6, 1e6 + 1e-4));
        assert!(!within_tolerance(1e6, 1e6 + 1e-2));
        assert!(within_tolerance(0.0, 5e-10));
        assert!(!within_tolerance(0.0, 5e-9));
        assert!(!within_tolerance(0.0, f64::NAN));
    }

    #[test]
    fn matching_set_passes() {
        // First step: infinite rate, L=[0,1] after the update, M moves 0 -> 0.
        let report = verify_fixture_set(&set(0.5));
        assert!(report.all_passed(), "{:?}", report.results);
        assert_eq!((report.total, report.passed), (2, 2));
        assert!(report.results[0].digest.is_some());
        assert!(report.results[1].digest.is_none());
    }

    #[test]
    fn mismatch_is_reported_with_location() {
        let report = verify_fixture_set(&set(0.25));
        assert_eq!(report.failed, 1);
        let detail = report.results[0].detail.as_deref().unwrap();
        assert!(detail.starts_with("mixability_gap"), "{detail}");
        assert!((report.results[0].max_abs_error - 0.25).abs() < 1e-12);
    }

    #[test]
    fn error_case_that_succeeds_fails() {
        let mut s = set(0.5);
        s.cases[0].expected = Expected::Error {
            error: "invalid_shape".into(),
        };
        let report = verify_fixture_set(&s);
        assert!(!report.results[0].passed);
    }

    #[test]
    fn markdown_lists_each_case() {
        let md = verify_fixture_set(&set(0.5)).render_markdown();
        assert!(md.contains("# Fixture verification: adahedge"));
        assert!(md.contains("| first_step | PASS |"));
        assert!(md.contains("| single | PASS |"));
    }
}
