use std::{collections::HashSet, sync::Arc, time::Instant};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    auditor::Auditor,
    error::ScrapeError,
    module::ModuleConfig,
    normalize::normalize_identifier,
    result::ScrapeResult,
};

/// Name of the marker emitted instead of any metrics when a scrape fails.
pub const ERROR_METRIC: &str = "inspec_error";
/// Wall-clock time of a whole collector run, not the tool's own figure.
pub const DURATION_METRIC: &str = "inspec_scrape_duration_seconds";

/// A single gauge sample: name, help text, value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricTuple {
    pub name: String,
    pub help: String,
    pub value: f64,
}

impl MetricTuple {
    pub fn new(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value,
        }
    }
}

/// Stands in for every metric of a collector whose scrape failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMarker {
    pub name: String,
    pub module: String,
    pub error: String,
}

/// What a collector hands to the exposition layer, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Emission {
    Gauge(MetricTuple),
    Error(ErrorMarker),
}

/// Collects metrics for one (target, module) pair. Build one per request; the
/// dedup state lives only for the duration of [`ScrapeCollector::collect`].
pub struct ScrapeCollector<A: Auditor> {
    auditor: Arc<A>,
    target: Option<String>,
    module: ModuleConfig,
}

impl<A: Auditor> ScrapeCollector<A> {
    pub fn new(auditor: Arc<A>, target: Option<String>, module: ModuleConfig) -> Self {
        let target = target.filter(|t| !t.is_empty());
        Self {
            auditor,
            target,
            module,
        }
    }

    /// Run the auditor and turn its report into emissions. A failed run yields
    /// exactly one [`Emission::Error`].
    #[instrument(
        name = "collect",
        skip(self),
        fields(target = self.target.as_deref().unwrap_or(""), module = %self.module.name)
    )]
    pub async fn collect(&self) -> Vec<Emission> {
        let start = Instant::now();
        let result = match self.scrape().await {
            Ok(result) => result,
            Err(err) => {
                if err.is_decode() {
                    warn!(error = %err, "auditor report could not be decoded");
                } else {
                    info!(error = %err, "error scraping target");
                }
                return vec![Emission::Error(ErrorMarker {
                    name: ERROR_METRIC.to_string(),
                    module: self.module.name.clone(),
                    error: err.to_string(),
                })];
            }
        };

        let mut emissions = self.emit_result(&result);
        emissions.push(Emission::Gauge(MetricTuple::new(
            DURATION_METRIC,
            "Time inspec took.",
            start.elapsed().as_secs_f64(),
        )));
        emissions
    }

    async fn scrape(&self) -> Result<ScrapeResult, ScrapeError> {
        let raw = self.auditor.run(self.target.as_deref(), &self.module).await?;
        let result = ScrapeResult::parse(&raw)?;
        debug!(
            controls = result.controls.len(),
            inspec_version = %result.version,
            inspec_duration = result.statistics.duration,
            "parsed auditor report"
        );
        Ok(result)
    }

    fn emit_result(&self, result: &ScrapeResult) -> Vec<Emission> {
        let prefix = &self.module.prefix;
        let prefixed = |identifier: &str| format!("{prefix}{identifier}");
        let mut emissions = Vec::with_capacity(result.controls.len() + 4);
        emissions.push(Emission::Gauge(MetricTuple::new(
            prefixed("total_returned"),
            "Tests returned from scrape process.",
            result.controls.len() as f64,
        )));

        // Summary names are reserved so a control cannot shadow them.
        let mut seen: HashSet<String> = ["total_returned", "total_passed", "duplicates"]
            .into_iter()
            .map(prefixed)
            .collect();
        let mut passed = 0usize;
        let mut duplicates = 0usize;
        for control in &result.controls {
            let name = prefixed(&normalize_identifier(&control.code_desc));
            if !seen.insert(name.clone()) {
                duplicates += 1;
                continue;
            }
            if control.is_passed() {
                passed += 1;
            }
            emissions.push(Emission::Gauge(MetricTuple::new(
                name,
                control.code_desc.clone(),
                if control.is_passed() { 1.0 } else { 0.0 },
            )));
        }
        if duplicates > 0 {
            warn!(duplicates, "controls collapsed onto existing metric names");
        }

        emissions.push(Emission::Gauge(MetricTuple::new(
            prefixed("total_passed"),
            "Tests passed in scrape process.",
            passed as f64,
        )));
        emissions.push(Emission::Gauge(MetricTuple::new(
            prefixed("duplicates"),
            "Tests dropped because their name collided with an earlier test.",
            duplicates as f64,
        )));
        emissions
    }
}
