use std::{fs, path::PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::ConfigError,
    normalize::normalize_identifier,
    settings::{ExporterSettings, ModuleSection},
};

/// How to audit one profile. Built per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleConfig {
    /// Module name as requested, used for logging and per-module stats.
    pub name: String,
    /// Prepended verbatim to every metric name of this module.
    pub prefix: String,
    pub path: PathBuf,
    pub ssh_user: String,
    pub ssh_identity_file: String,
    pub ssh_port: u16,
    pub need_sudo: bool,
}

impl ModuleConfig {
    /// Synthetic configuration for a profile without an explicit section.
    pub fn synthetic(name: &str, settings: &ExporterSettings) -> Self {
        Self {
            name: name.to_string(),
            prefix: derived_prefix(name),
            path: settings.profile_path.join(name),
            ssh_user: String::new(),
            ssh_identity_file: String::new(),
            ssh_port: 0,
            need_sudo: false,
        }
    }

    /// Read every field from `section`. Absent fields stay zero unless the
    /// section opts into `inherit_defaults`.
    pub fn from_section(
        name: &str,
        section: &ModuleSection,
        settings: &ExporterSettings,
    ) -> Result<Self, ConfigError> {
        let inherit = section.inherit_defaults;
        let defaults = &settings.defaults;

        let prefix = match (&section.prefix, inherit) {
            (Some(prefix), _) => prefix.clone(),
            (None, true) => derived_prefix(name),
            (None, false) => String::new(),
        };
        if prefix.is_empty() {
            return Err(ConfigError::InvalidModule {
                module: name.to_string(),
                reason: "prefix must not be empty".into(),
            });
        }

        let path = match (&section.path, inherit) {
            (Some(path), _) => path.clone(),
            (None, true) => settings.profile_path.join(name),
            (None, false) => {
                return Err(ConfigError::InvalidModule {
                    module: name.to_string(),
                    reason: "no profile path configured".into(),
                })
            }
        };

        let pick = |value: &Option<String>, fallback: &String| match value {
            Some(value) => value.clone(),
            None if inherit => fallback.clone(),
            None => String::new(),
        };

        Ok(Self {
            name: name.to_string(),
            prefix,
            path,
            ssh_user: pick(&section.ssh_user, &defaults.ssh_user),
            ssh_identity_file: pick(&section.ssh_identity_file, &defaults.ssh_identity_file),
            ssh_port: section
                .ssh_port
                .unwrap_or(if inherit { defaults.ssh_port } else { 0 }),
            need_sudo: section
                .need_sudo
                .unwrap_or(inherit && defaults.need_sudo),
        })
    }
}

/// Resolve a single requested module.
pub fn resolve(module: &str, settings: &ExporterSettings) -> Result<ModuleConfig, ConfigError> {
    ensure_profile_path(settings)?;
    resolve_entry(module, settings)
}

/// Resolve every profile found under `profile_path`, in name order. Entries
/// that fail to resolve are logged and skipped so the rest of the batch runs.
pub fn resolve_all(settings: &ExporterSettings) -> Result<Vec<ModuleConfig>, ConfigError> {
    ensure_profile_path(settings)?;
    let unreadable = |source| ConfigError::ProfilePathUnreadable {
        path: settings.profile_path.clone(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(&settings.profile_path).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();

    let mut modules = Vec::with_capacity(names.len());
    for name in names {
        match resolve_entry(&name, settings) {
            Ok(module) => modules.push(module),
            Err(err) => warn!(module = %name, error = %err, "skipping profile"),
        }
    }
    debug!(count = modules.len(), "resolved batch modules");
    Ok(modules)
}

fn resolve_entry(module: &str, settings: &ExporterSettings) -> Result<ModuleConfig, ConfigError> {
    if module.is_empty() || module.contains(['/', '\\']) || matches!(module, "." | "..") {
        return Err(ConfigError::UnknownModule {
            module: module.to_string(),
        });
    }
    let config = match settings.modules.get(module) {
        Some(section) => ModuleConfig::from_section(module, section, settings)?,
        None => ModuleConfig::synthetic(module, settings),
    };
    if !config.path.exists() {
        return Err(ConfigError::UnknownModule {
            module: module.to_string(),
        });
    }
    Ok(config)
}

fn ensure_profile_path(settings: &ExporterSettings) -> Result<(), ConfigError> {
    let path = &settings.profile_path;
    if path.as_os_str().is_empty() || !path.exists() {
        return Err(ConfigError::ProfilePathMissing { path: path.clone() });
    }
    Ok(())
}

/// Prefix for a module without a configured one: the normalized module name
/// plus a trailing `_`. A leading digit is guarded so the metric name stays valid.
fn derived_prefix(name: &str) -> String {
    let prefix = normalize_identifier(name);
    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{prefix}_")
    } else {
        format!("{prefix}_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConnectionDefaults;
    use std::path::Path;

    fn settings_in(root: &Path) -> ExporterSettings {
        ExporterSettings {
            profile_path: root.to_path_buf(),
            defaults: ConnectionDefaults {
                ssh_user: "auditor".into(),
                ssh_identity_file: "/keys/id_ed25519".into(),
                ssh_port: 22,
                need_sudo: true,
            },
            ..ExporterSettings::default()
        }
    }

    #[test]
    fn synthetic_module_without_section() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("ssh-baseline")).unwrap();
        let settings = settings_in(temp.path());

        let module = resolve("ssh-baseline", &settings).unwrap();
        assert_eq!(module.prefix, "ssh_baseline_");
        assert_eq!(module.path, temp.path().join("ssh-baseline"));
        assert!(module.ssh_user.is_empty());
        assert_eq!(module.ssh_port, 0);
        assert!(!module.need_sudo);
    }

    #[test]
    fn explicit_section_falls_back_to_zero_values() {
        let temp = tempfile::tempdir().unwrap();
        let profile = temp.path().join("elsewhere");
        fs::create_dir(&profile).unwrap();
        let mut settings = settings_in(temp.path());
        settings.modules.insert(
            "sudoers".into(),
            ModuleSection {
                path: Some(profile.clone()),
                prefix: Some("sudo_".into()),
                ssh_port: Some(2222),
                ..ModuleSection::default()
            },
        );

        let module = resolve("sudoers", &settings).unwrap();
        assert_eq!(module.prefix, "sudo_");
        assert_eq!(module.path, profile);
        assert_eq!(module.ssh_port, 2222);
        assert!(module.ssh_user.is_empty(), "global defaults must not leak in");
        assert!(module.ssh_identity_file.is_empty());
        assert!(!module.need_sudo);
    }

    #[test]
    fn inherit_defaults_pulls_global_block() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("linux")).unwrap();
        let mut settings = settings_in(temp.path());
        settings.modules.insert(
            "linux".into(),
            ModuleSection {
                need_sudo: Some(false),
                inherit_defaults: true,
                ..ModuleSection::default()
            },
        );

        let module = resolve("linux", &settings).unwrap();
        assert_eq!(module.prefix, "linux_");
        assert_eq!(module.path, temp.path().join("linux"));
        assert_eq!(module.ssh_user, "auditor");
        assert_eq!(module.ssh_identity_file, "/keys/id_ed25519");
        assert_eq!(module.ssh_port, 22);
        assert!(!module.need_sudo, "explicit field wins over defaults");
    }

    #[test]
    fn section_without_prefix_is_invalid() {
        let temp = tempfile::tempdir().unwrap();
        let mut settings = settings_in(temp.path());
        settings.modules.insert(
            "bare".into(),
            ModuleSection {
                path: Some(temp.path().to_path_buf()),
                ..ModuleSection::default()
            },
        );
        let err = resolve("bare", &settings).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModule { ref module, .. } if module == "bare"));
        assert!(err.is_client_error());
    }

    #[test]
    fn unknown_module_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let settings = settings_in(temp.path());
        for name in ["missing", "../etc", "..", ""] {
            let err = resolve(name, &settings).unwrap_err();
            assert!(matches!(err, ConfigError::UnknownModule { .. }), "{name}");
        }
    }

    #[test]
    fn missing_profile_path_fails_first() {
        let settings = ExporterSettings {
            profile_path: PathBuf::from("/definitely/not/here"),
            ..ExporterSettings::default()
        };
        assert!(matches!(
            resolve("anything", &settings),
            Err(ConfigError::ProfilePathMissing { .. })
        ));
        assert!(matches!(
            resolve_all(&ExporterSettings::default()),
            Err(ConfigError::ProfilePathMissing { .. })
        ));
    }

    #[test]
    fn batch_mode_lists_profiles_in_order_and_skips_bad_entries() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", ".git", "broken"] {
            fs::create_dir(temp.path().join(name)).unwrap();
        }
        let mut settings = settings_in(temp.path());
        settings.modules.insert(
            "broken".into(),
            ModuleSection {
                path: Some(temp.path().join("gone")),
                prefix: Some("broken".into()),
                ..ModuleSection::default()
            },
        );

        let modules = resolve_all(&settings).unwrap();
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn derived_prefixes_are_normalized_and_separated() {
        assert_eq!(derived_prefix("My Profile"), "my_profile_");
        assert_eq!(derived_prefix("2fa"), "_2fa_");
        assert_eq!(derived_prefix("sudoers"), "sudoers_");
    }

    #[test]
    fn configured_prefix_is_kept_verbatim() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir(temp.path().join("sudoers")).unwrap();
        let mut settings = settings_in(temp.path());
        settings.modules.insert(
            "sudoers".into(),
            ModuleSection {
                path: Some(temp.path().join("sudoers")),
                prefix: Some("Sudo".into()),
                ..ModuleSection::default()
            },
        );

        let module = resolve("sudoers", &settings).unwrap();
        assert_eq!(module.prefix, "Sudo");
    }
}
