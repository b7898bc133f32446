use std::{
    env,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use inspec_exporter_core::ExporterSettings;
use tracing::info;

const DEFAULT_CONFIG_NAME: &str = "inspec_exporter";
const ENV_PREFIX: &str = "INSPEC_EXPORTER";

/// Where settings come from: an explicit file, or the default search path.
#[derive(Debug, Clone)]
pub struct SettingsSource {
    explicit: Option<PathBuf>,
}

impl SettingsSource {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from("."), PathBuf::from("/etc/inspec_exporter")];
        if let Some(home) = env::var_os("HOME") {
            dirs.push(PathBuf::from(home).join(".inspec_exporter"));
        }
        dirs.into_iter()
            .map(|dir| dir.join(DEFAULT_CONFIG_NAME))
            .collect()
    }

    /// Read the file(s) and `INSPEC_EXPORTER_*` overrides into settings.
    pub fn load(&self) -> Result<ExporterSettings> {
        let mut builder = Config::builder();
        match &self.explicit {
            Some(path) => {
                builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(true));
            }
            None => {
                // Later sources win, so search from least to most specific.
                for candidate in Self::search_paths().iter().rev() {
                    builder = builder
                        .add_source(File::with_name(&candidate.to_string_lossy()).required(false));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

        let settings: ExporterSettings = builder
            .build()
            .context("failed to read exporter configuration")?
            .try_deserialize()
            .context("invalid exporter configuration")?;
        if settings.profile_path.as_os_str().is_empty() {
            bail!(
                "'profile_path' is not configured (config file: {})",
                self.describe()
            );
        }
        Ok(settings)
    }

    fn describe(&self) -> String {
        match &self.explicit {
            Some(path) => path.display().to_string(),
            None => Self::search_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Holds the current settings snapshot. Requests clone the `Arc` once and keep
/// a consistent view even if a reload swaps the snapshot meanwhile.
pub struct SettingsStore {
    source: SettingsSource,
    current: RwLock<Arc<ExporterSettings>>,
}

impl SettingsStore {
    pub fn load(source: SettingsSource) -> Result<Self> {
        let settings = source.load()?;
        Ok(Self::with_settings(source, settings))
    }

    pub fn with_settings(source: SettingsSource, settings: ExporterSettings) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<ExporterSettings> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Re-read the configuration. On failure the previous snapshot stays active.
    pub fn reload(&self) -> Result<()> {
        let settings = self.source.load()?;
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(settings);
        info!(source = %self.source.describe(), "configuration reloaded");
        Ok(())
    }
}

/// Find the auditor binary the way a shell would: paths with a separator are
/// taken as-is, bare names are looked up in `PATH`.
pub fn locate_binary(binary: &Path) -> Result<PathBuf> {
    if binary.components().count() > 1 {
        if binary.is_file() {
            return Ok(binary.to_path_buf());
        }
        bail!("inspec binary {} does not exist", binary.display());
    }
    let path = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
        .with_context(|| format!("inspec binary `{}` not found in PATH", binary.display()))
}

/// Accept Go-style `:9124` as shorthand for all interfaces.
pub fn normalize_listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("exporter.yaml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_yaml_with_modules() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(
            temp.path(),
            "profile_path: /srv/profiles\ninspec_path: /opt/inspec/bin/inspec\nmodules:\n  sudoers:\n    prefix: sudo_\n    ssh_port: 2222\n    need_sudo: true\n",
        );

        let settings = SettingsSource::new(Some(path)).load().unwrap();
        assert_eq!(settings.profile_path, PathBuf::from("/srv/profiles"));
        assert_eq!(settings.inspec_path, PathBuf::from("/opt/inspec/bin/inspec"));
        assert_eq!(settings.listen_address, ":9124");
        let sudoers = &settings.modules["sudoers"];
        assert_eq!(sudoers.prefix.as_deref(), Some("sudo_"));
        assert_eq!(sudoers.ssh_port, Some(2222));
        assert_eq!(sudoers.need_sudo, Some(true));
        assert!(sudoers.path.is_none());
    }

    #[test]
    fn missing_profile_path_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "inspec_path: inspec\n");
        let err = SettingsSource::new(Some(path)).load().unwrap_err();
        assert!(err.to_string().contains("profile_path"));
    }

    #[test]
    fn reload_swaps_snapshot_and_keeps_old_on_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_config(temp.path(), "profile_path: /first\n");
        let store = SettingsStore::load(SettingsSource::new(Some(path.clone()))).unwrap();
        let before = store.snapshot();

        fs::write(&path, "profile_path: /second\n").unwrap();
        store.reload().unwrap();
        assert_eq!(store.snapshot().profile_path, PathBuf::from("/second"));
        assert_eq!(before.profile_path, PathBuf::from("/first"));

        fs::write(&path, "profile_path: [not, a, path\n").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().profile_path, PathBuf::from("/second"));
    }

    #[test]
    fn listen_address_shorthand() {
        assert_eq!(normalize_listen_address(":9124"), "0.0.0.0:9124");
        assert_eq!(normalize_listen_address("127.0.0.1:8080"), "127.0.0.1:8080");
    }

    #[test]
    fn locates_explicit_binary() {
        let temp = tempfile::tempdir().unwrap();
        let bin = temp.path().join("inspec");
        fs::write(&bin, "").unwrap();
        assert_eq!(locate_binary(&bin).unwrap(), bin);
        assert!(locate_binary(&temp.path().join("missing")).is_err());
        assert!(locate_binary(Path::new("definitely-not-a-real-binary-name")).is_err());
    }
}
