//! Configuration for the persona agent
//!
//! Loaded from a TOML file, or built from the process environment. Secrets are
//! never stored in the file: the file names the environment variables that
//! hold them, and they are resolved when a client is built.

use crate::llm::providers::openai::OpenAiConfig;
use crate::persona::{Intent, PersonaRegistry};
use crate::voice::trtc::DEFAULT_TRTC_ENDPOINT;
use crate::voice::{
    LazyVoiceBackend, TrtcClient, TrtcConfig, TtsCredentials, VoiceBackend, VoiceNotifier,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Paths searched, in order, when no config file is given
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["agent.toml", "config/agent.toml"];

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub llm: LlmSection,
    #[serde(default)]
    pub voice: VoiceSection,
    #[serde(default)]
    pub personas: PersonaSection,
}

/// Model backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Voice backend settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_secret_id_env")]
    pub secret_id_env: String,
    #[serde(default = "default_secret_key_env")]
    pub secret_key_env: String,
    #[serde(default)]
    pub region: String,
    #[serde(default = "default_trtc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_tts_app_id_env")]
    pub tts_app_id_env: String,
    #[serde(default = "default_tts_secret_id_env")]
    pub tts_secret_id_env: String,
    #[serde(default = "default_tts_secret_key_env")]
    pub tts_secret_key_env: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_voice_timeout")]
    pub timeout_secs: u64,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_id_env: default_secret_id_env(),
            secret_key_env: default_secret_key_env(),
            region: String::new(),
            endpoint: default_trtc_endpoint(),
            tts_app_id_env: default_tts_app_id_env(),
            tts_secret_id_env: default_tts_secret_id_env(),
            tts_secret_key_env: default_tts_secret_key_env(),
            speed: default_speed(),
            timeout_secs: default_voice_timeout(),
        }
    }
}

/// Optional system prompt overrides per persona
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonaSection {
    pub xiao_mei_prompt: Option<String>,
    pub xiao_shuai_prompt: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_secret_id_env() -> String {
    "TRTC_SECRET_ID".to_string()
}

fn default_secret_key_env() -> String {
    "TRTC_SECRET_KEY".to_string()
}

fn default_trtc_endpoint() -> String {
    DEFAULT_TRTC_ENDPOINT.to_string()
}

fn default_tts_app_id_env() -> String {
    "TTS_APP_ID".to_string()
}

fn default_tts_secret_id_env() -> String {
    "TTS_SECRET_ID".to_string()
}

fn default_tts_secret_key_env() -> String {
    "TTS_SECRET_KEY".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_voice_timeout() -> u64 {
    10
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment
    ///
    /// Reads `OPENAI_MODEL`, `OPENAI_BASE_URL`, `TRTC_REGION` and
    /// `TRTC_ENDPOINT`; empty or unset values fall back to the defaults.
    /// Secrets stay behind their default variable names.
    pub fn from_env() -> Result<Self, ConfigError> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let config = Self {
            llm: LlmSection {
                model: non_empty("OPENAI_MODEL").unwrap_or_else(default_model),
                base_url: non_empty("OPENAI_BASE_URL").unwrap_or_else(default_base_url),
                api_key_env: default_api_key_env(),
                timeout_secs: default_llm_timeout(),
            },
            voice: VoiceSection {
                region: non_empty("TRTC_REGION").unwrap_or_default(),
                endpoint: non_empty("TRTC_ENDPOINT").unwrap_or_else(default_trtc_endpoint),
                ..VoiceSection::default()
            },
            personas: PersonaSection::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// First existing file among [`DEFAULT_CONFIG_PATHS`]
    pub fn find_config_file() -> Option<PathBuf> {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("llm.model must not be empty".to_string()));
        }

        let base_url = url::Url::parse(&self.llm.base_url).map_err(|e| {
            ConfigError::InvalidConfig(format!("llm.base_url '{}' is not a valid URL: {e}", self.llm.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidConfig(format!(
                "llm.base_url must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        if self.llm.timeout_secs == 0 || self.voice.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig("timeouts must be positive".to_string()));
        }

        if !(self.voice.speed.is_finite() && self.voice.speed > 0.0) {
            return Err(ConfigError::InvalidConfig(format!(
                "voice.speed must be positive, got {}",
                self.voice.speed
            )));
        }

        Ok(())
    }

    fn get_env_var_optional(name: &str) -> String {
        std::env::var(name).unwrap_or_default()
    }

    fn get_env_var_required(name: &str) -> Result<String, ConfigError> {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::EnvVarNotFound(name.to_string()))
    }

    /// Get the model API key from its environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        Self::get_env_var_required(&self.llm.api_key_env)
    }

    /// Provider settings with the API key resolved
    pub fn openai_config(&self) -> Result<OpenAiConfig, ConfigError> {
        Ok(OpenAiConfig {
            api_key: self.get_llm_api_key()?,
            base_url: self.llm.base_url.clone(),
            timeout: Duration::from_secs(self.llm.timeout_secs),
        })
    }

    /// Voice client settings with credentials resolved
    ///
    /// Missing credentials resolve to empty values; the voice API rejects the
    /// call later and the failure is logged like any other voice failure.
    pub fn trtc_config(&self) -> Result<TrtcConfig, ConfigError> {
        let voice = &self.voice;

        let raw_app_id = Self::get_env_var_optional(&voice.tts_app_id_env);
        let app_id = if raw_app_id.trim().is_empty() {
            0
        } else {
            raw_app_id.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidConfig(format!(
                    "{} must be a numeric app id, got '{raw_app_id}'",
                    voice.tts_app_id_env
                ))
            })?
        };

        Ok(TrtcConfig {
            secret_id: Self::get_env_var_optional(&voice.secret_id_env),
            secret_key: Self::get_env_var_optional(&voice.secret_key_env),
            region: voice.region.clone(),
            endpoint: voice.endpoint.clone(),
            tts: TtsCredentials {
                app_id,
                secret_id: Self::get_env_var_optional(&voice.tts_secret_id_env),
                secret_key: Self::get_env_var_optional(&voice.tts_secret_key_env),
            },
            speed: voice.speed,
            timeout: Duration::from_secs(voice.timeout_secs),
        })
    }

    /// Voice notifier backed by a lazily built TRTC client
    ///
    /// Voice settings that cannot be resolved disable the notifier with a
    /// warning; they never stop the agent.
    pub fn voice_notifier(&self, personas: &PersonaRegistry) -> VoiceNotifier {
        if !self.voice.enabled {
            info!("Voice backend disabled by configuration");
            return VoiceNotifier::disabled();
        }

        let trtc_config = match self.trtc_config() {
            Ok(trtc_config) => trtc_config,
            Err(e) => {
                warn!(error = %e, "Invalid voice settings, TTS updates disabled");
                return VoiceNotifier::disabled();
            }
        };

        let personas = personas.clone();
        let backend = LazyVoiceBackend::new(move || {
            let client = TrtcClient::new(trtc_config.clone(), personas.clone())?;
            Ok(Arc::new(client) as Arc<dyn VoiceBackend>)
        });
        VoiceNotifier::new(Arc::new(backend))
    }

    /// Persona registry with any configured prompt overrides applied
    pub fn persona_registry(&self) -> PersonaRegistry {
        let mut registry = PersonaRegistry::default();
        if let Some(prompt) = &self.personas.xiao_mei_prompt {
            registry = registry.with_prompt(Intent::XiaoMei, prompt.as_str());
        }
        if let Some(prompt) = &self.personas.xiao_shuai_prompt {
            registry = registry.with_prompt(Intent::XiaoShuai, prompt.as_str());
        }
        registry
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
model = "gpt-4o-mini"
base_url = "http://localhost:8080/v1"
api_key_env = "PERSONA_AGENT_TEST_API_KEY"

[voice]
enabled = false
region = "ap-guangzhou"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}
