//! Configuration management for aiosd.
//!
//! Loads settings from /etc/aios/agent.toml (or `$AIOS_AGENT_CONFIG`) and
//! provider credentials from the environment. Resolved once at startup and
//! shared read-only afterwards.

use aios_common::hal::HalBackend;
use aios_common::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment override for the config file path
pub const CONFIG_ENV: &str = "AIOS_AGENT_CONFIG";

/// Environment override for the HAL backend
pub const HAL_ENV: &str = "AIOS_HAL";

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Remote language-model provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local fallback only
    None,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::None => "none",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-3-opus-20240229",
            ProviderKind::None | ProviderKind::OpenAi => "gpt-4",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::None => None,
            ProviderKind::OpenAi => Some(OPENAI_KEY_ENV),
            ProviderKind::Anthropic => Some(ANTHROPIC_KEY_ENV),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider endpoint URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "default_openai_url")]
    pub openai: String,

    #[serde(default = "default_anthropic_url")]
    pub anthropic: String,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            openai: default_openai_url(),
            anthropic: default_anthropic_url(),
        }
    }
}

/// On-disk configuration, every key optional
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Unset means: pick whichever provider has a key
    #[serde(default)]
    pub provider: Option<ProviderKind>,

    #[serde(default)]
    pub model: Option<String>,

    /// Chat-originated shutdown/reboot need the word "confirm"
    #[serde(default = "default_confirm_dangerous")]
    pub confirm_dangerous: bool,

    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Hard timeout per provider call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Delay between acknowledging shutdown/reboot and performing it
    #[serde(default = "default_power_action_delay")]
    pub power_action_delay_secs: u64,

    #[serde(default)]
    pub hal: HalBackend,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub endpoints: Endpoints,
}

fn default_confirm_dangerous() -> bool {
    true
}

fn default_socket_path() -> PathBuf {
    paths::default_agent_socket()
}

fn default_history_capacity() -> usize {
    20
}

fn default_max_message_size() -> usize {
    aios_common::frame::AGENT_MAX_MESSAGE_SIZE
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_power_action_delay() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            confirm_dangerous: default_confirm_dangerous(),
            socket_path: default_socket_path(),
            history_capacity: default_history_capacity(),
            max_message_size: default_max_message_size(),
            request_timeout_secs: default_request_timeout(),
            max_tokens: default_max_tokens(),
            power_action_delay_secs: default_power_action_delay(),
            hal: HalBackend::default(),
            log_level: default_log_level(),
            log_file: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl ConfigFile {
    /// Read a config file; a missing file yields defaults
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "history_capacity must be at least 2 (got {})",
                self.history_capacity
            )));
        }
        if !(1024..=16 * 1024 * 1024).contains(&self.max_message_size) {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must be between 1 KiB and 16 MiB (got {})",
                self.max_message_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolved agent configuration, immutable for the process lifetime
#[derive(Clone, PartialEq)]
pub struct AgentConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub credentials: HashMap<ProviderKind, String>,
    pub confirm_dangerous: bool,
    pub socket_path: PathBuf,
    pub history_capacity: usize,
    pub max_message_size: usize,
    pub request_timeout: Duration,
    pub max_tokens: u32,
    pub power_action_delay: Duration,
    pub hal: HalBackend,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub endpoints: Endpoints,
    /// File the configuration was read from (defaults when it is absent)
    pub config_path: PathBuf,
    /// Why a requested provider was dropped in favour of the local fallback
    pub provider_notice: Option<String>,
}

// Hand-written so credentials never reach a log line
impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.credentials.keys().map(|k| k.as_str()).collect();
        f.debug_struct("AgentConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credentials", &keys)
            .field("confirm_dangerous", &self.confirm_dangerous)
            .field("socket_path", &self.socket_path)
            .field("history_capacity", &self.history_capacity)
            .field("max_message_size", &self.max_message_size)
            .field("request_timeout", &self.request_timeout)
            .field("power_action_delay", &self.power_action_delay)
            .field("hal", &self.hal)
            .finish_non_exhaustive()
    }
}

impl AgentConfig {
    /// Load from the default location and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(paths::default_agent_config);
        Self::load_from(&path, |key| std::env::var(key).ok())
    }

    /// Load from an explicit file and environment lookup
    pub fn load_from<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = ConfigFile::read(path)?;
        file.validate()?;
        let mut config = Self::resolve(file, env)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Report how the configuration was resolved. Called once logging is up,
    /// since loading happens before the subscriber exists.
    pub fn log_summary(&self) {
        info!(
            "Config loaded from {} (provider: {}, model: {})",
            self.config_path.display(),
            self.provider,
            self.model
        );
        if let Some(notice) = &self.provider_notice {
            info!("{}", notice);
        }
    }

    /// Merge a parsed file with environment credentials and overrides
    pub fn resolve<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut credentials = HashMap::new();
        for kind in [ProviderKind::OpenAi, ProviderKind::Anthropic] {
            if let Some(key) = kind.key_env().and_then(|var| lookup(var)) {
                credentials.insert(kind, key);
            }
        }

        let (provider, provider_notice) = select_provider(file.provider, &credentials);
        let model = file
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());

        let socket_path = lookup(paths::SOCKET_ENV)
            .map(PathBuf::from)
            .unwrap_or(file.socket_path);

        let hal = match lookup(HAL_ENV) {
            Some(raw) => raw.parse::<HalBackend>().map_err(ConfigError::Invalid)?,
            None => file.hal,
        };

        Ok(Self {
            provider,
            model,
            credentials,
            confirm_dangerous: file.confirm_dangerous,
            socket_path,
            history_capacity: file.history_capacity,
            max_message_size: file.max_message_size,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            max_tokens: file.max_tokens,
            power_action_delay: Duration::from_secs(file.power_action_delay_secs),
            hal,
            log_level: file.log_level,
            log_file: file.log_file,
            endpoints: file.endpoints,
            config_path: paths::default_agent_config(),
            provider_notice,
        })
    }

    pub fn credential(&self, kind: ProviderKind) -> Option<&str> {
        self.credentials.get(&kind).map(String::as_str)
    }

    /// True when chat requests go to a remote provider first
    pub fn ai_configured(&self) -> bool {
        self.provider != ProviderKind::None
    }
}

impl Default for AgentConfig {
    /// Defaults with no credentials: local fallback only
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            provider: ProviderKind::None,
            model: ProviderKind::None.default_model().to_string(),
            credentials: HashMap::new(),
            confirm_dangerous: file.confirm_dangerous,
            socket_path: file.socket_path,
            history_capacity: file.history_capacity,
            max_message_size: file.max_message_size,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            max_tokens: file.max_tokens,
            power_action_delay: Duration::from_secs(file.power_action_delay_secs),
            hal: file.hal,
            log_level: file.log_level,
            log_file: file.log_file,
            endpoints: file.endpoints,
            config_path: paths::default_agent_config(),
            provider_notice: None,
        }
    }
}

/// Missing credentials degrade to local-only mode; the reason comes back
/// alongside the choice so it can be logged after startup
fn select_provider(
    requested: Option<ProviderKind>,
    credentials: &HashMap<ProviderKind, String>,
) -> (ProviderKind, Option<String>) {
    match requested {
        Some(ProviderKind::None) => (ProviderKind::None, None),
        Some(kind) if credentials.contains_key(&kind) => (kind, None),
        Some(kind) => (
            ProviderKind::None,
            Some(format!(
                "Provider {} selected but {} is not set; using local fallback",
                kind,
                kind.key_env().unwrap_or("its API key")
            )),
        ),
        None if credentials.contains_key(&ProviderKind::OpenAi) => (ProviderKind::OpenAi, None),
        None if credentials.contains_key(&ProviderKind::Anthropic) => {
            (ProviderKind::Anthropic, None)
        }
        None => (ProviderKind::None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_credentials() {
        let config = AgentConfig::resolve(ConfigFile::default(), env_of(&[])).unwrap();
        assert_eq!(config.provider, ProviderKind::None);
        assert!(!config.ai_configured());
        assert_eq!(config.model, "gpt-4");
        assert!(config.confirm_dangerous);
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.max_message_size, 65536);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_auto_selects_openai_first() {
        let env = env_of(&[(OPENAI_KEY_ENV, "sk-a"), (ANTHROPIC_KEY_ENV, "sk-b")]);
        let config = AgentConfig::resolve(ConfigFile::default(), env).unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.credential(ProviderKind::Anthropic), Some("sk-b"));
    }

    #[test]
    fn test_auto_selects_anthropic_when_only_key() {
        let env = env_of(&[(ANTHROPIC_KEY_ENV, "sk-b")]);
        let config = AgentConfig::resolve(ConfigFile::default(), env).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.model, "claude-3-opus-20240229");
    }

    #[test]
    fn test_explicit_provider_without_key_degrades() {
        let file = ConfigFile {
            provider: Some(ProviderKind::Anthropic),
            ..ConfigFile::default()
        };
        let config = AgentConfig::resolve(file, env_of(&[(OPENAI_KEY_ENV, "sk-a")])).unwrap();
        assert_eq!(config.provider, ProviderKind::None);
        let notice = config.provider_notice.as_deref().unwrap();
        assert!(notice.contains("anthropic"));
        assert!(notice.contains(ANTHROPIC_KEY_ENV));
    }

    #[test]
    fn test_auto_mode_without_keys_has_no_notice() {
        let config = AgentConfig::resolve(ConfigFile::default(), env_of(&[])).unwrap();
        assert!(config.provider_notice.is_none());
        assert_eq!(config.config_path, paths::default_agent_config());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config =
            AgentConfig::resolve(ConfigFile::default(), env_of(&[(OPENAI_KEY_ENV, "  ")])).unwrap();
        assert_eq!(config.provider, ProviderKind::None);
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[(paths::SOCKET_ENV, "/tmp/a.sock"), (HAL_ENV, "virtual")]);
        let config = AgentConfig::resolve(ConfigFile::default(), env).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/a.sock"));
        assert_eq!(config.hal, HalBackend::Virtual);

        let bad = AgentConfig::resolve(ConfigFile::default(), env_of(&[(HAL_ENV, "quantum")]));
        assert!(matches!(bad, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
provider = "openai"
model = "gpt-4o-mini"
confirm_dangerous = false
history_capacity = 8
hal = "virtual"

[endpoints]
openai = "http://127.0.0.1:9999/v1/chat/completions"
"#
        )
        .unwrap();

        let config =
            AgentConfig::load_from(file.path(), env_of(&[(OPENAI_KEY_ENV, "sk-test")])).unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(!config.confirm_dangerous);
        assert_eq!(config.history_capacity, 8);
        assert_eq!(config.hal, HalBackend::Virtual);
        assert_eq!(config.endpoints.openai, "http://127.0.0.1:9999/v1/chat/completions");
        assert_eq!(config.endpoints.anthropic, default_anthropic_url());
        assert_eq!(config.config_path, file.path());
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AgentConfig::load_from(&path, env_of(&[])).unwrap();
        assert_eq!(
            config,
            AgentConfig {
                config_path: path,
                ..AgentConfig::default()
            }
        );
    }

    #[test]
    fn test_malformed_and_invalid_files_fail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = [").unwrap();
        let err = AgentConfig::load_from(file.path(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "history_capacity = 1").unwrap();
        let err = AgentConfig::load_from(file.path(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_debug_never_prints_keys() {
        let config =
            AgentConfig::resolve(ConfigFile::default(), env_of(&[(OPENAI_KEY_ENV, "sk-secret")]))
                .unwrap();
        let printed = format!("{:?}", config);
        assert!(printed.contains("openai"));
        assert!(!printed.contains("sk-secret"));
    }
}
