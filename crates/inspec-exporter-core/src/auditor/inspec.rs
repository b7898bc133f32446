use std::{ffi::OsString, path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{Auditor, EXIT_CONTROLS_FAILED};
use crate::{error::ScrapeError, module::ModuleConfig};

const MAX_ERROR_OUTPUT_CHARS: usize = 512;

/// Runs the `inspec` binary once per call. Nothing is shared between calls,
/// so concurrent scrapes spawn concurrent processes.
#[derive(Debug, Clone)]
pub struct InspecAuditor {
    binary: PathBuf,
}

impl InspecAuditor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// Command line for `inspec exec`. Connection flags are only added for a non-empty target.
pub fn build_args(target: Option<&str>, module: &ModuleConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "exec".into(),
        module.path.clone().into_os_string(),
        "--reporter".into(),
        "json-min".into(),
    ];
    if let Some(target) = target.filter(|t| !t.is_empty()) {
        args.push("-t".into());
        args.push(
            format!(
                "ssh://{}@{}:{}",
                module.ssh_user, target, module.ssh_port
            )
            .into(),
        );
        args.push("-i".into());
        args.push(module.ssh_identity_file.clone().into());
        if module.need_sudo {
            args.push("--sudo".into());
        }
    }
    args
}

#[async_trait]
impl Auditor for InspecAuditor {
    #[instrument(name = "inspec_exec", skip(self, module), fields(module = %module.name))]
    async fn run(
        &self,
        target: Option<&str>,
        module: &ModuleConfig,
    ) -> Result<Vec<u8>, ScrapeError> {
        let args = build_args(target, module);
        debug!(binary = %self.binary.display(), ?args, "invoking auditor");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ScrapeError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        match output.status.code() {
            Some(0) | Some(EXIT_CONTROLS_FAILED) => {
                debug!(status = ?output.status.code(), bytes = combined.len(), "auditor finished");
                Ok(combined)
            }
            _ => Err(ScrapeError::Exit {
                status: output.status.to_string(),
                output: truncate(&String::from_utf8_lossy(&combined), MAX_ERROR_OUTPUT_CHARS),
            }),
        }
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    let trimmed = input.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect::<String>() + "…"
}
