pub mod auditor;
pub mod collector;
pub mod error;
pub mod exposition;
pub mod module;
pub mod normalize;
pub mod registry;
pub mod result;
pub mod scrape;
pub mod settings;
pub mod stats;

pub use auditor::{inspec::InspecAuditor, Auditor};
pub use collector::{Emission, ErrorMarker, MetricTuple, ScrapeCollector};
pub use error::{ConfigError, ScrapeError};
pub use module::{resolve, resolve_all, ModuleConfig};
pub use normalize::normalize_identifier;
pub use registry::Registry;
pub use result::{CheckOutcome, ScrapeResult, Statistics};
pub use scrape::{run_scrape, ScrapeOutcome, ScrapeRequest};
pub use settings::{ConnectionDefaults, ExporterSettings, ModuleSection};
pub use stats::ExporterStats;
