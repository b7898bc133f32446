use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

/// Process-wide exporter configuration, read-only while a request runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterSettings {
    /// Directory holding one sub-directory per InSpec profile.
    #[serde(default)]
    pub profile_path: PathBuf,
    #[serde(default = "default_inspec_path")]
    pub inspec_path: PathBuf,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Connection values used by sections that opt into `inherit_defaults`.
    #[serde(default)]
    pub defaults: ConnectionDefaults,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleSection>,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            profile_path: PathBuf::new(),
            inspec_path: default_inspec_path(),
            listen_address: default_listen_address(),
            defaults: ConnectionDefaults::default(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_inspec_path() -> PathBuf {
    PathBuf::from("inspec")
}

fn default_listen_address() -> String {
    ":9124".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDefaults {
    pub ssh_user: String,
    pub ssh_identity_file: String,
    pub ssh_port: u16,
    pub need_sudo: bool,
}

/// Explicit per-module section. Every field is optional; what is missing
/// stays at its zero value unless `inherit_defaults` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSection {
    pub path: Option<PathBuf>,
    pub prefix: Option<String>,
    pub ssh_user: Option<String>,
    pub ssh_identity_file: Option<String>,
    pub ssh_port: Option<u16>,
    pub need_sudo: Option<bool>,
    pub inherit_defaults: bool,
}
