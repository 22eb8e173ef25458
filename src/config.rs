//! Configuration file loading
//!
//! Lookup order for the config file:
//! 1. `--config` on the command line
//! 2. `INDUSTRY_PLANNER_CONFIG` environment variable
//! 3. `./industry-planner.toml` if it exists
//! 4. Compiled defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PlannerError, Result};
use crate::location::DEFAULT_FRESHNESS_SECS;

pub const CONFIG_ENV_VAR: &str = "INDUSTRY_PLANNER_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "industry-planner.toml";
pub const DEFAULT_DATABASE: &str = "industry_planner.db";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    pub database: PathBuf,
    pub log_filter: String,
    pub default_scientists: u32,
    pub location_freshness_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            database: PathBuf::from(DEFAULT_DATABASE),
            log_filter: "info".to_string(),
            default_scientists: 0,
            location_freshness_secs: DEFAULT_FRESHNESS_SECS,
        }
    }
}

impl PlannerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PlannerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| PlannerError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Resolve using the process environment and working directory
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::resolve_from(cli_path, env_path.as_deref(), Path::new("."))
    }

    /// An explicitly named file must exist; the working-directory file is optional.
    pub fn resolve_from(cli_path: Option<&Path>, env_path: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = cli_path.or(env_path) {
            return Self::load(path);
        }

        let local = cwd.join(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(&local);
        }

        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = PlannerConfig::from_toml("default_scientists = 2\n").unwrap();
        assert_eq!(config.default_scientists, 2);
        assert_eq!(config.database, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(config.location_freshness_secs, 3600);
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let err = PlannerConfig::from_toml("colour = \"blue\"\n").unwrap_err();
        assert!(matches!(err, PlannerError::Config(_)));
    }

    #[test]
    fn resolution_order() {
        let dir = tempfile::tempdir().unwrap();
        let cli = dir.path().join("cli.toml");
        let env = dir.path().join("env.toml");
        fs::write(&cli, "log_filter = \"debug\"\n").unwrap();
        fs::write(&env, "log_filter = \"warn\"\n").unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "log_filter = \"trace\"\n").unwrap();

        let pick = |c: Option<&Path>, e: Option<&Path>| {
            PlannerConfig::resolve_from(c, e, dir.path()).unwrap().log_filter
        };
        assert_eq!(pick(Some(&cli), Some(&env)), "debug");
        assert_eq!(pick(None, Some(&env)), "warn");
        assert_eq!(pick(None, None), "trace");

        let empty = tempfile::tempdir().unwrap();
        let config = PlannerConfig::resolve_from(None, None, empty.path()).unwrap();
        assert_eq!(config, PlannerConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(PlannerConfig::resolve_from(Some(&missing), None, dir.path()).is_err());
    }
}
