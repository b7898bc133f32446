use std::{sync::Arc, time::Instant};

use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::{
    auditor::Auditor,
    collector::ScrapeCollector,
    error::ConfigError,
    module::{resolve, resolve_all, ModuleConfig},
    registry::Registry,
    settings::ExporterSettings,
    stats::ExporterStats,
};

/// Parameters of one inbound scrape. Empty strings mean "local" and "all modules".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub target: String,
    pub module: String,
}

/// Everything one request produced.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub registry: Registry,
    pub collectors: usize,
}

impl ScrapeOutcome {
    /// True when there was at least one collector and none of them produced metrics.
    pub fn all_failed(&self) -> bool {
        self.collectors > 0 && self.registry.errors().len() == self.collectors
    }
}

/// Resolve the modules a request asks for.
pub fn modules_for(
    request: &ScrapeRequest,
    settings: &ExporterSettings,
) -> Result<Vec<ModuleConfig>, ConfigError> {
    if request.module.is_empty() {
        resolve_all(settings)
    } else {
        resolve(&request.module, settings).map(|module| vec![module])
    }
}

/// Serve one scrape: resolve modules, run one collector per module
/// concurrently and gather their output into a fresh [`Registry`].
///
/// Configuration errors and failed collectors bump the request error counter.
#[instrument(name = "scrape", skip_all, fields(target = %request.target, module = %request.module))]
pub async fn run_scrape<A: Auditor>(
    request: &ScrapeRequest,
    settings: &ExporterSettings,
    auditor: Arc<A>,
    stats: &ExporterStats,
) -> Result<ScrapeOutcome, ConfigError> {
    let start = Instant::now();
    let modules = match modules_for(request, settings) {
        Ok(modules) => modules,
        Err(err) => {
            warn!(error = %err, "rejecting scrape request");
            stats.inc_request_errors();
            return Err(err);
        }
    };

    let target = Some(request.target.clone());
    let collectors: Vec<_> = modules
        .into_iter()
        .map(|module| ScrapeCollector::new(Arc::clone(&auditor), target.clone(), module))
        .collect();
    let outputs = join_all(collectors.iter().map(|collector| collector.collect())).await;

    let mut registry = Registry::new();
    for output in outputs {
        registry.register(output);
    }
    stats.add_request_errors(registry.errors().len() as u64);

    let elapsed = start.elapsed();
    stats.observe_collection(&request.module, elapsed);
    debug!(
        collectors = collectors.len(),
        errors = registry.errors().len(),
        seconds = elapsed.as_secs_f64(),
        "scrape finished"
    );

    Ok(ScrapeOutcome {
        registry,
        collectors: collectors.len(),
    })
}
