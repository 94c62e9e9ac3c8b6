// src/infra/config.rs — Configuration loading (TOML + environment)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::ledger::{resolve_attempt_cap, DEFAULT_ATTEMPT_CAP};
use crate::core::timeout::TimeoutConfig;
use crate::infra::paths;

/// Environment variable that overrides `[generation] attempt_cap`.
pub const ATTEMPT_CAP_ENV: &str = "PLANCRAFT_ATTEMPT_CAP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub timeout: TimeoutConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Raw cap as written; read through `Config::attempt_cap()`.
    pub attempt_cap: i64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            attempt_cap: DEFAULT_ATTEMPT_CAP as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.4,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8787 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to the data directory when unset.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load config from the default location, falling back to defaults, then
    /// apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ATTEMPT_CAP_ENV) {
            self.apply_attempt_cap_override(&raw);
        }
    }

    fn apply_attempt_cap_override(&mut self, raw: &str) {
        match raw.trim().parse::<i64>() {
            Ok(value) => self.generation.attempt_cap = value,
            Err(_) => {
                tracing::warn!(
                    value = raw,
                    default = DEFAULT_ATTEMPT_CAP,
                    "Ignoring invalid {ATTEMPT_CAP_ENV}"
                );
                self.generation.attempt_cap = DEFAULT_ATTEMPT_CAP as i64;
            }
        }
    }

    /// The effective attempt cap (always >= 1).
    pub fn attempt_cap(&self) -> u32 {
        resolve_attempt_cap(Some(self.generation.attempt_cap))
    }

    pub fn db_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(paths::db_path)
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}
