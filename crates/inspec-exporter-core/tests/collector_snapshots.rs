use std::{fs, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use inspec_exporter_core::{
    collector::DURATION_METRIC, Auditor, Emission, ModuleConfig, ScrapeCollector, ScrapeError,
};
use insta::assert_json_snapshot;
use serde_json::json;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Replays a recorded `inspec exec --reporter json-min` report.
struct FixtureAuditor {
    name: &'static str,
}

#[async_trait]
impl Auditor for FixtureAuditor {
    async fn run(
        &self,
        target: Option<&str>,
        _module: &ModuleConfig,
    ) -> Result<Vec<u8>, ScrapeError> {
        assert!(target.is_none(), "fixtures are replayed in local mode");
        let path = fixture_dir().join(self.name);
        Ok(fs::read(&path)
            .unwrap_or_else(|err| panic!("failed to read fixture {}: {err}", path.display())))
    }
}

fn module(name: &str, prefix: &str) -> ModuleConfig {
    ModuleConfig {
        name: name.into(),
        prefix: prefix.into(),
        path: PathBuf::from("/profiles").join(name),
        ssh_user: String::new(),
        ssh_identity_file: String::new(),
        ssh_port: 0,
        need_sudo: false,
    }
}

async fn collect_fixture(fixture: &'static str, module: ModuleConfig) -> serde_json::Value {
    let collector = ScrapeCollector::new(Arc::new(FixtureAuditor { name: fixture }), None, module);
    let emissions = collector.collect().await;

    let (duration, gauges) = emissions
        .split_last()
        .unwrap_or_else(|| panic!("fixture {fixture} produced no emissions"));
    assert!(
        matches!(duration, Emission::Gauge(g) if g.name == DURATION_METRIC && g.value >= 0.0),
        "last emission must be the scrape duration"
    );

    json!(gauges
        .iter()
        .map(|emission| match emission {
            Emission::Gauge(g) => json!({
                "help": g.help,
                "name": g.name,
                "value": g.value as u64,
            }),
            Emission::Error(marker) => panic!("unexpected error marker: {}", marker.error),
        })
        .collect::<Vec<_>>())
}

#[tokio::test(flavor = "current_thread")]
async fn linux_baseline_snapshot() {
    let snapshot = collect_fixture("linux_baseline.json", module("linux-baseline", "linux_")).await;
    assert_json_snapshot!("linux_baseline", snapshot);
}

#[tokio::test(flavor = "current_thread")]
async fn sample_scenario_snapshot() {
    let snapshot = collect_fixture("sample_scenario.json", module("sample", "sample_")).await;
    assert_json_snapshot!("sample_scenario", snapshot);
}
