use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use crate::exposition::{self, MetricFamily, MetricKind, Sample};

/// Metrics about the exporter itself, shared by all requests through an `Arc`.
#[derive(Debug, Default)]
pub struct ExporterStats {
    request_errors: AtomicU64,
    /// module label -> (observations, total seconds)
    collections: Mutex<BTreeMap<String, (u64, f64)>>,
}

impl ExporterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_request_errors(&self) {
        self.add_request_errors(1);
    }

    pub fn add_request_errors(&self, count: u64) {
        self.request_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn request_errors(&self) -> u64 {
        self.request_errors.load(Ordering::Relaxed)
    }

    /// Record how long a whole scrape request took for `module` (empty = batch).
    pub fn observe_collection(&self, module: &str, elapsed: Duration) {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = collections.entry(module.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += elapsed.as_secs_f64();
    }

    pub fn collection_count(&self, module: &str) -> u64 {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(module)
            .map_or(0, |(count, _)| *count)
    }

    /// Exposition for the exporter's own `/metrics` endpoint.
    pub fn render(&self, version: &str) -> String {
        let collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut summary = Vec::with_capacity(collections.len() * 2);
        for (module, (count, sum)) in collections {
            let labels = vec![("module".to_string(), module)];
            summary.push(Sample {
                suffix: "_sum",
                labels: labels.clone(),
                value: sum,
            });
            summary.push(Sample {
                suffix: "_count",
                labels,
                value: count as f64,
            });
        }

        let families = [
            MetricFamily {
                name: "inspec_collection_duration_seconds".into(),
                help: "Duration of collections by the inspec exporter".into(),
                kind: MetricKind::Summary,
                samples: summary,
            },
            MetricFamily {
                name: "inspec_request_errors_total".into(),
                help: "Errors in requests to the inspec exporter".into(),
                kind: MetricKind::Counter,
                samples: vec![Sample::plain(self.request_errors() as f64)],
            },
            MetricFamily {
                name: "inspec_exporter_build_info".into(),
                help: "Build information of the inspec exporter".into(),
                kind: MetricKind::Gauge,
                samples: vec![Sample {
                    suffix: "",
                    labels: vec![("version".to_string(), version.to_string())],
                    value: 1.0,
                }],
            },
        ];
        exposition::encode(&families, Vec::new())
    }
}
