use std::collections::HashSet;

use tracing::warn;

use crate::{
    collector::{Emission, ErrorMarker, MetricTuple},
    exposition::{self, MetricFamily, MetricKind, Sample},
};

/// Request-scoped sink for collector output. Never shared between requests,
/// so identical metric names from different scrapes cannot collide.
#[derive(Debug, Default)]
pub struct Registry {
    gauges: Vec<MetricTuple>,
    names: HashSet<String>,
    errors: Vec<ErrorMarker>,
    rejected: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a collector's emissions. Gauges whose name is already taken in
    /// this registry are dropped; the first one wins.
    pub fn register(&mut self, emissions: impl IntoIterator<Item = Emission>) {
        for emission in emissions {
            match emission {
                Emission::Gauge(tuple) => {
                    if self.names.insert(tuple.name.clone()) {
                        self.gauges.push(tuple);
                    } else {
                        warn!(metric = %tuple.name, "metric already registered in this scrape, dropping");
                        self.rejected += 1;
                    }
                }
                Emission::Error(marker) => self.errors.push(marker),
            }
        }
    }

    pub fn gauges(&self) -> &[MetricTuple] {
        &self.gauges
    }

    pub fn errors(&self) -> &[ErrorMarker] {
        &self.errors
    }

    /// Gauges dropped because another collector already used the name.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Text exposition of everything registered so far.
    pub fn render(&self) -> String {
        let families: Vec<_> = self
            .gauges
            .iter()
            .map(|tuple| MetricFamily {
                name: tuple.name.clone(),
                help: tuple.help.clone(),
                kind: MetricKind::Gauge,
                samples: vec![Sample::plain(tuple.value)],
            })
            .collect();
        let errors = self
            .errors
            .iter()
            .map(|marker| format!("{} module {}: {}", marker.name, marker.module, marker.error));
        exposition::encode(&families, errors)
    }
}
