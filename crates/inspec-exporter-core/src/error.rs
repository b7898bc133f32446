use std::path::PathBuf;

use thiserror::Error;

/// Failures while turning a request into module configurations. Raised before
/// the auditor is ever started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'profile_path' {} is empty or does not exist", .path.display())]
    ProfilePathMissing { path: PathBuf },
    #[error("'profile_path' {} is not readable: {source}", .path.display())]
    ProfilePathUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown module '{module}'")]
    UnknownModule { module: String },
    #[error("module '{module}' is invalid: {reason}")]
    InvalidModule { module: String, reason: String },
}

impl ConfigError {
    /// Whether the request itself was at fault (bad module name) rather than
    /// the exporter's own configuration.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnknownModule { .. } | Self::InvalidModule { .. })
    }
}

/// Failures of a single collector run. Each one collapses into an error marker.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("failed to start auditor {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("auditor exited with {status}: {output}")]
    Exit { status: String, output: String },
    #[error("auditor output is not a valid report: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ScrapeError {
    /// `Decode` failures come from the payload; everything else from running the tool.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_is_client_error() {
        let err = ConfigError::UnknownModule {
            module: "sudoers".into(),
        };
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Unknown module 'sudoers'");
    }

    #[test]
    fn missing_profile_path_is_server_error() {
        let err = ConfigError::ProfilePathMissing {
            path: PathBuf::from("/nope"),
        };
        assert!(!err.is_client_error());
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn decode_errors_are_classified() {
        let json_err = serde_json::from_slice::<serde_json::Value>(b"{").unwrap_err();
        let err = ScrapeError::from(json_err);
        assert!(err.is_decode());
        let exit = ScrapeError::Exit {
            status: "exit status: 1".into(),
            output: "boom".into(),
        };
        assert!(!exit.is_decode());
        assert!(exit.to_string().contains("boom"));
    }
}
