use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub const CONFIG_ENV: &str = "REGISTER_WEAVER_CONFIG";

/// How implementer registration calls are ordered in the synthesized body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOrder {
    /// Sorted by internal class name, duplicates removed.
    #[default]
    Lexicographic,
    /// Scan completion order. Not reproducible when several units contribute.
    Discovery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMethod {
    pub name: String,
    pub descriptor: String,
}

impl Default for RegisterMethod {
    fn default() -> Self {
        Self {
            name: "register".to_string(),
            descriptor: "()V".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    pub registrar_suffix: String,
    pub capability_interface: String,
    pub collector_annotation_suffix: String,
    pub register_method: RegisterMethod,
    pub excluded_path_fragments: Vec<String>,
    pub registration_order: RegistrationOrder,
    pub threads: Option<usize>,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            registrar_suffix: "CommercialServiceRegister".to_string(),
            capability_interface: "com/kuaishou/commercial/utility/ioc/ICommercialServiceRegister"
                .to_string(),
            collector_annotation_suffix: "RegisterCollector;".to_string(),
            register_method: RegisterMethod::default(),
            excluded_path_fragments: vec![
                "com.android.support".to_string(),
                "/android/m2repository".to_string(),
            ],
            registration_order: RegistrationOrder::default(),
            threads: None,
        }
    }
}

impl WeaverConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn is_excluded_path(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.excluded_path_fragments
            .iter()
            .any(|fragment| path.contains(fragment.as_str()))
    }
}

pub fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.config.clone() {
        return Some(p);
    }
    env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

pub fn resolve_config(cli: &Cli) -> Result<WeaverConfig> {
    match resolve_config_path(cli) {
        Some(path) => WeaverConfig::load(&path),
        None => Ok(WeaverConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "register_weaver_config_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn partial_config_file_keeps_defaults() -> Result<()> {
        let path = temp_path("partial.json");
        std::fs::write(
            &path,
            r#"{ "registrar_suffix": "ModuleRegistrar", "registration_order": "discovery", "threads": 3 }"#,
        )?;

        let config = WeaverConfig::load(&path)?;
        assert_eq!(config.registrar_suffix, "ModuleRegistrar");
        assert_eq!(config.registration_order, RegistrationOrder::Discovery);
        assert_eq!(config.threads, Some(3));
        assert_eq!(
            config.collector_annotation_suffix,
            WeaverConfig::default().collector_annotation_suffix
        );
        assert_eq!(config.register_method.name, "register");

        std::fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn excluded_path_matches_fragments() {
        let config = WeaverConfig::default();
        assert!(config.is_excluded_path(Path::new(
            "/sdk/extras/android/m2repository/com/android/support/appcompat.jar"
        )));
        assert!(!config.is_excluded_path(Path::new("/build/intermediates/classes.jar")));
    }

    #[test]
    fn load_reports_invalid_json_with_path() {
        let path = temp_path("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = WeaverConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
        let _ = std::fs::remove_file(path);
    }
}
