use async_trait::async_trait;

use crate::{error::ScrapeError, module::ModuleConfig};

pub mod inspec;

/// Exit status the auditor uses for "ran fine, some controls failed".
pub const EXIT_CONTROLS_FAILED: i32 = 100;

/// Abstraction over the external compliance tool so tests can swap in canned reports.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Run the module's profile, against `target` over SSH when given or
    /// locally otherwise, and return the raw report bytes.
    async fn run(&self, target: Option<&str>, module: &ModuleConfig)
        -> Result<Vec<u8>, ScrapeError>;
}
