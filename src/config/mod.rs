//! Runtime configuration.
//!
//! Resolution order: `--config <path>` if given, otherwise `config.toml` in
//! the platform config directory if it exists, otherwise built-in defaults.
//! Environment variables then fill in the credential and may override the
//! model id. Paths accept `~` and `$VAR` expansion.

use crate::error::{Error, Result};
use crate::persona::{PersonaRegistry, DEFAULT_PERSONA_ID};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Credential fallback that applies to every provider.
pub const API_KEY_ENV: &str = "CHARACTER_PERSONA_API_KEY";
pub const MODEL_ENV: &str = "CHARACTER_PERSONA_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persona used when a request does not name a character.
    pub default_persona: String,
    /// Replacement for the builtin persona table.
    pub personas_file: Option<String>,
    pub server: ServerConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `gemini` or `openai` (any OpenAI-compatible chat completions API).
    pub provider: String,
    pub model: String,
    /// Overrides the provider's public endpoint.
    pub base_url: Option<String>,
    /// Left empty in files that are committed; usually supplied via env.
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_persona: DEFAULT_PERSONA_ID.to_string(),
            personas_file: None,
            server: ServerConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

impl ModelConfig {
    /// Configured credential, treating blank strings as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Provider-specific environment variable for the credential.
    pub fn provider_key_env(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "gemini" => Some("GEMINI_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    /// Platform default location, e.g. `~/.config/character-persona/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "character-persona")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `explicit`, else the default path if present, else defaults.
    /// Environment overrides are applied in every case.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(&expand_path(&path.to_string_lossy()))?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }

    /// Fill the credential from the environment when the file leaves it
    /// empty, and let `CHARACTER_PERSONA_MODEL` override the model id.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.model.credential().is_none() {
            let from_provider = self.model.provider_key_env().and_then(|key| non_blank(key));
            self.model.api_key = from_provider.or_else(|| non_blank(API_KEY_ENV));
        }
        if let Some(model) = non_blank(MODEL_ENV) {
            self.model.model = model;
        }
    }

    pub fn personas_path(&self) -> Option<PathBuf> {
        self.personas_file.as_deref().map(expand_path)
    }

    /// Persona registry for this config, with the default persona verified.
    pub fn load_registry(&self) -> Result<PersonaRegistry> {
        let registry = match self.personas_path() {
            Some(path) => PersonaRegistry::from_file(&path)?,
            None => PersonaRegistry::builtin()?,
        };
        if !registry.contains(&self.default_persona) {
            return Err(Error::Config(format!(
                "default persona '{}' is not defined",
                self.default_persona
            )));
        }
        Ok(registry)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("could not expand path '{raw}': {e}");
            PathBuf::from(raw)
        }
    }
}
