/*
 * Enclave - Sandboxed Tool-Calling Agent
 * File Path: src/config.rs
 * Responsibility: YAML configuration structure, discovery and loading
 */
use anyhow::{Context, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "enclave.yml";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct GeminiConfig {
    /// Usually left empty and supplied through `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash-001".to_string(),
            temperature: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Sandbox root, relative to the process working directory.
    pub working_dir: PathBuf,
    pub max_iterations: usize,
    pub character_limit: usize,
    pub script_timeout_secs: u64,
    pub interpreter: String,
    pub script_extension: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("./calculator"),
            max_iterations: 20,
            character_limit: 10_000,
            script_timeout_secs: 30,
            interpreter: "python3".to_string(),
            script_extension: "py".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs.max(1))
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations.max(1)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file at {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load the effective configuration.
    /// Priority: CLI path > ./enclave.yml > ~/.enclave/enclave.yml > defaults.
    /// The API key from the environment always wins over the file.
    pub fn discover(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        config.apply_env(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|key| !key.trim().is_empty()) {
            self.gemini.api_key = Some(key);
        }
    }
}

fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // 1. Explicit path must exist; load() reports it otherwise
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // 2. Current directory
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }

    // 3. Home directory
    home_dir()
        .map(|home| home.join(".enclave").join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "runtime:\n  max_iterations: 3\n  working_dir: ./sandbox\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.runtime.max_iterations, 3);
        assert_eq!(config.runtime.working_dir, PathBuf::from("./sandbox"));
        assert_eq!(config.runtime.character_limit, 10_000);
        assert_eq!(config.gemini.model, "gemini-2.0-flash-001");
        assert!(config.gemini.api_key.is_none());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.yml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_key_overrides_file_key() {
        let mut config = Config::default();
        config.gemini.api_key = Some("from-file".to_string());

        config.apply_env(Some("  ".to_string()));
        assert_eq!(config.gemini.api_key.as_deref(), Some("from-file"));

        config.apply_env(Some("from-env".to_string()));
        assert_eq!(config.gemini.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_limits_are_clamped() {
        let runtime = RuntimeConfig {
            max_iterations: 0,
            script_timeout_secs: 0,
            ..RuntimeConfig::default()
        };
        assert_eq!(runtime.max_iterations(), 1);
        assert_eq!(runtime.script_timeout(), Duration::from_secs(1));
    }
}
