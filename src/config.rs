use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini-pro";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_CONFIG_FILE: &str = "gemini-chat.toml";
pub const CONFIG_PATH_ENV: &str = "GEMINI_CHAT_CONFIG";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Sampling parameters forwarded to the provider as `generationConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub max_output_tokens: i32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 2048,
        }
    }
}

/// What a session does when the model succeeds but returns no text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResponse {
    /// Chat clears the placeholder and adds nothing; single-turn stays Loading.
    #[default]
    Keep,
    /// Treat the empty response as a failed turn.
    Error,
}

/// Everything that may live in the TOML file. The API key never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the credential
    pub api_key_env: String,
    pub empty_response: EmptyResponse,
    /// Per-request limit for calls to the provider
    pub timeout_secs: u64,
    pub generation: GenerationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            empty_response: EmptyResponse::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            generation: GenerationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub settings: Settings,
    pub api_key: Option<String>,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl AppConfig {
    /// Load settings from `path` (or the default locations) and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from),
        };
        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok());

        match &config.source {
            Some(p) => tracing::info!(path = %p.display(), model = %config.settings.model, "configuration loaded"),
            None => tracing::info!(model = %config.settings.model, "using default configuration"),
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(Self {
            settings,
            api_key: None,
            source: None,
        })
    }

    /// Overlay environment overrides and pick up the credential.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("GEMINI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.settings.model = model;
        }
        if let Some(url) = lookup("GEMINI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.settings.base_url = url;
        }
        self.api_key = lookup(&self.settings.api_key_env).filter(|v| !v.trim().is_empty());
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "{} environment variable not set. Please copy .env.example to .env and set your API key.",
                self.settings.api_key_env
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.settings.model, "gemini-pro");
        assert_eq!(config.settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.settings.empty_response, EmptyResponse::Keep);
        assert_eq!(config.settings.generation.top_k, 40);
        assert_eq!(config.settings.timeout_secs, 60);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
model = "gemini-1.5-flash"
empty_response = "error"
timeout_secs = 15

[generation]
temperature = 0.2
"#,
        )
        .unwrap();
        assert_eq!(config.settings.model, "gemini-1.5-flash");
        assert_eq!(config.settings.empty_response, EmptyResponse::Error);
        assert_eq!(config.settings.timeout_secs, 15);
        assert_eq!(config.settings.generation.temperature, 0.2);
        assert_eq!(config.settings.generation.max_output_tokens, 2048);
    }

    #[test]
    fn test_env_overrides_and_key() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("GEMINI_MODEL", "gemini-1.5-pro"),
            ("GEMINI_API_KEY", "secret"),
        ]));
        assert_eq!(config.settings.model, "gemini-1.5-pro");
        assert_eq!(config.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_custom_key_variable() {
        let mut config = AppConfig::from_toml_str(r#"api_key_env = "MY_KEY""#).unwrap();
        config.apply_env(env_from(&[("GEMINI_API_KEY", "wrong"), ("MY_KEY", "right")]));
        assert_eq!(config.api_key.as_deref(), Some("right"));
    }

    #[test]
    fn test_missing_key_names_variable() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[("GEMINI_API_KEY", "   ")]));
        let err = config.require_api_key().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_from_file_records_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"model = "from-file""#).unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.settings.model, "from-file");
        assert_eq!(config.source.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = ").unwrap();
        assert!(AppConfig::from_file(file.path()).is_err());
    }
}
