//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use neuroscreen_core::generation::GenerationConfig;
use neuroscreen_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "neuroscreen.toml";

/// Configuration for a single LLM provider.
///
/// `Debug` masks API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level neuroscreen configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuroscreenConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Classifier artifact; the built-in model is used when unset.
    #[serde(default)]
    pub classifier_path: Option<PathBuf>,
    /// Static question bank (file or directory) used instead of an LLM.
    #[serde(default)]
    pub question_bank: Option<PathBuf>,
    /// JSON snapshot of the assessment store.
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_shuffle")]
    pub shuffle_questions: bool,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_data_path() -> PathBuf {
    PathBuf::from("./neuroscreen-data.json")
}
fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}
fn default_shuffle() -> bool {
    true
}

impl Default for NeuroscreenConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            classifier_path: None,
            question_bank: None,
            data_path: default_data_path(),
            bind_addr: default_bind_addr(),
            shuffle_questions: default_shuffle(),
        }
    }
}

impl NeuroscreenConfig {
    /// Question generation settings derived from this configuration.
    pub fn generation_config(&self, model: Option<&str>) -> GenerationConfig {
        GenerationConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.default_temperature,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ..GenerationConfig::default()
        }
    }

    /// Look up a provider by name, falling back to `default_provider`.
    pub fn provider(&self, name: Option<&str>) -> Result<(&str, &ProviderConfig)> {
        let name = name.unwrap_or(self.default_provider.as_str());
        self.providers
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .with_context(|| {
                format!(
                    "provider '{name}' is not configured. Add it to {CONFIG_FILE_NAME} or set NEUROSCREEN_{}_KEY",
                    name.to_uppercase()
                )
            })
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `neuroscreen.toml` in the current directory
/// 2. `~/.config/neuroscreen/config.toml`
///
/// Environment variable overrides: `NEUROSCREEN_ANTHROPIC_KEY`, `NEUROSCREEN_OPENAI_KEY`.
pub fn load_config() -> Result<NeuroscreenConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<NeuroscreenConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() {
                Some(local)
            } else {
                global_config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|p| p.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<NeuroscreenConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            config
        }
        None => NeuroscreenConfig::default(),
    };

    apply_env_overrides(&mut config);

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn apply_env_overrides(config: &mut NeuroscreenConfig) {
    if let Ok(key) = std::env::var("NEUROSCREEN_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("NEUROSCREEN_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn global_config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("neuroscreen"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Box<dyn LlmProvider> {
    match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Box::new(AnthropicProvider::new(api_key, base_url.clone()))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Box::new(OpenAiProvider::new(api_key, base_url.clone(), org_id.clone())),
        ProviderConfig::Ollama { base_url } => Box::new(OllamaProvider::new(base_url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_NEUROSCREEN_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_NEUROSCREEN_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_NEUROSCREEN_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("unterminated ${OOPS"), "unterminated ${OOPS");
        std::env::remove_var("_NEUROSCREEN_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = NeuroscreenConfig::default();
        assert_eq!(config.default_provider, "anthropic");
        assert_eq!(config.default_temperature, 0.7);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.bind_addr.port(), 8000);
        assert!(config.shuffle_questions);
        assert!(config.classifier_path.is_none());
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "ollama"
default_model = "llama3.1:8b"
question_bank = "banks/"
classifier_path = "models/risk.json"
data_path = "state.json"
bind_addr = "127.0.0.1:9000"
shuffle_questions = false
retry_delay_ms = 250

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.ollama]
type = "ollama"
"#;
        let config: NeuroscreenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.bind_addr.port(), 9000);
        assert!(!config.shuffle_questions);
        assert_eq!(config.question_bank.as_deref(), Some(Path::new("banks/")));
        assert!(matches!(
            config.providers.get("ollama"),
            Some(ProviderConfig::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));

        let generation = config.generation_config(None);
        assert_eq!(generation.model, "llama3.1:8b");
        assert_eq!(generation.retry_delay, Duration::from_millis(250));
        assert_eq!(config.provider(None).unwrap().0, "ollama");
    }

    #[test]
    fn missing_provider_has_hint() {
        let config = NeuroscreenConfig::default();
        let err = config.provider(Some("openai")).unwrap_err();
        assert!(err.to_string().contains("NEUROSCREEN_OPENAI_KEY"));
    }

    #[test]
    fn debug_masks_keys() {
        let config = ProviderConfig::Anthropic {
            api_key: "sk-secret".into(),
            base_url: None,
        };
        let out = format!("{config:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("***"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "default_model = \"gpt-4.1\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_model, "gpt-4.1");

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
