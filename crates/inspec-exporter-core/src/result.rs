use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// Status token InSpec reports for a control that held.
pub const STATUS_PASSED: &str = "passed";

/// Outcome of a single control as reported by `--reporter json-min`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckOutcome {
    pub id: String,
    pub profile_id: String,
    pub profile_sha256: String,
    /// `passed`, `failed`, `skipped`, `error`, ... kept verbatim.
    pub status: String,
    /// Human-readable description, the source of the metric name.
    pub code_desc: String,
    pub message: Option<String>,
    pub skip_message: Option<String>,
    pub resource: Option<String>,
}

impl CheckOutcome {
    /// Only an exact `passed` counts; skipped and errored controls are failures.
    pub fn is_passed(&self) -> bool {
        self.status == STATUS_PASSED
    }
}

/// Run statistics reported by the auditor itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    /// Seconds, as measured by the tool.
    pub duration: f64,
}

/// Parsed outcome of one auditor invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeResult {
    pub controls: Vec<CheckOutcome>,
    pub statistics: Statistics,
    /// Version string of the auditor that produced the report.
    pub version: String,
}

impl ScrapeResult {
    /// Decode the combined auditor output. Any structural problem is fatal.
    pub fn parse(raw: &[u8]) -> Result<Self, ScrapeError> {
        Ok(serde_json::from_slice(raw)?)
    }
}
