//! Configuration parsing and validation for promptgate.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub routing: RoutingConfig,
    pub providers: Vec<ProviderConfig>,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Origins allowed to call the API. `"*"` allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Upper bound for an uploaded file, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Total timeout for non-streaming upstream calls.
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    /// Connect timeout for every upstream call.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How `/api/chat-stream` relays upstream bytes.
    #[serde(default)]
    pub stream_mode: StreamMode,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_upstream_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            stream_mode: StreamMode::default(),
        }
    }
}

impl ServerConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whether `origin` is on the allow-list.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.trim_end_matches('/') == origin)
    }
}

/// Streaming relay strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Decode upstream SSE and re-emit `{"content": ...}` events.
    #[default]
    Reframe,
    /// Forward upstream bytes unchanged.
    Passthrough,
}

/// Documented fallback pair used for empty or unrecognized selectors.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    pub default_provider: String,
    pub default_model: String,
}

/// Upstream API family an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Openai,
    Deepseek,
    Together,
    Openrouter,
    Gemini,
    OpenaiImage,
    Generic,
}

impl ProviderKind {
    /// Base URL used when the provider entry omits `url`.
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Openai | ProviderKind::OpenaiImage => Some("https://api.openai.com/v1"),
            ProviderKind::Deepseek => Some("https://api.deepseek.com/v1"),
            ProviderKind::Together => Some("https://api.together.xyz/v1"),
            ProviderKind::Openrouter => Some("https://openrouter.ai/api/v1"),
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderKind::Generic => None,
        }
    }

    /// Whether requests to this kind must carry a credential.
    pub fn requires_key(&self) -> bool {
        !matches!(self, ProviderKind::Generic)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Together => "together",
            ProviderKind::Openrouter => "openrouter",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenaiImage => "openai_image",
            ProviderKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// API key wrapper that redacts in Debug/Display/Serialize and zeroizes on drop.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Access the raw key value. Every call site is auditable via `grep expose_secret`.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for ApiKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| ApiKey(SecretString::from(s)))
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        ApiKey(SecretString::from(s))
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        ApiKey(SecretString::from(s.to_string()))
    }
}

/// How a provider's API key was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KeySource {
    /// Key was a literal string in config (no ${} references)
    Literal,
    /// Key contained ${VAR} references expanded from environment
    EnvExpanded,
    /// Key was auto-discovered from convention env var (holds var name)
    Convention(String),
    /// No key available
    None,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal => write!(f, "config-literal"),
            KeySource::EnvExpanded => write!(f, "env-expanded"),
            KeySource::Convention(var) => write!(f, "convention ({})", var),
            KeySource::None => write!(f, "none"),
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Unique name, also the selector namespace (`<name>/<model>`)
    pub name: String,
    pub kind: ProviderKind,
    /// Base URL for the provider's API (e.g., "https://openrouter.ai/api/v1")
    pub url: String,
    pub api_key: Option<ApiKey>,
    /// Model used when the selector names only the provider
    pub default_model: Option<String>,
    /// Bare model identifiers that imply this provider
    pub models: Vec<String>,
    /// Extra headers sent on every request (attribution, org ids)
    pub headers: BTreeMap<String, String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },

    #[error("Provider '{provider}' has no API key; set {var} or `api_key` in the config")]
    MissingKey { provider: String, var: String },
}

/// Raw provider config deserialized directly from TOML.
/// `api_key` is `Option<String>` so it may contain `${VAR}` references not yet expanded.
#[derive(Debug, Deserialize)]
pub struct RawProviderConfig {
    name: String,
    kind: ProviderKind,
    url: Option<String>,
    api_key: Option<String>,
    default_model: Option<String>,
    #[serde(default)]
    models: Vec<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Raw configuration deserialized directly from TOML.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    routing: RoutingConfig,
    #[serde(default)]
    providers: Vec<RawProviderConfig>,
    #[serde(default)]
    logging: LoggingConfig,
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}/v1`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(
    input: &str,
    provider_name: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            provider: provider_name.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                provider: provider_name.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            provider: provider_name.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in provider '{}')",
                var_name, provider_name
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

/// Derive the convention-based env var name for a provider.
///
/// - "openai" -> "OPENAI_API_KEY"
/// - "open-router" -> "OPEN_ROUTER_API_KEY"
pub fn convention_env_var_name(provider_name: &str) -> String {
    let upper_snake = provider_name.to_uppercase().replace(['-', ' ', '.'], "_");
    format!("{}_API_KEY", upper_snake)
}

impl Config {
    /// Load configuration from a TOML file, expanding credentials from the environment.
    ///
    /// Returns the config and per-provider key source information.
    pub fn from_file(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string using the process environment.
    pub fn parse_str(content: &str) -> Result<(Self, Vec<(String, KeySource)>), ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string with a custom environment lookup.
    pub fn parse_str_with<F>(
        content: &str,
        lookup: F,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = toml::from_str(content)?;
        let (config, key_sources) = Self::from_raw(raw, lookup)?;
        config.validate()?;
        Ok((config, key_sources))
    }

    /// Convert raw (deserialized) config to final config with env var expansion.
    ///
    /// For each provider:
    /// - If `api_key` contains `${VAR}`: expand from environment, source = `EnvExpanded`
    /// - If `api_key` is a literal string: wrap directly, source = `Literal`
    /// - If `api_key` is absent: try `<NAME>_API_KEY`, source = `Convention(var)` or `None`
    pub fn from_raw<F>(
        raw: RawConfig,
        lookup: F,
    ) -> Result<(Self, Vec<(String, KeySource)>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers = Vec::with_capacity(raw.providers.len());
        let mut key_sources = Vec::with_capacity(raw.providers.len());

        for rp in raw.providers {
            // Blank keys count as absent so they never reach an Authorization header.
            let (api_key, source) = match rp.api_key.filter(|k| !k.trim().is_empty()) {
                Some(raw_key) if raw_key.contains("${") => {
                    let expanded = expand_env_vars_with(&raw_key, &rp.name, &lookup)?;
                    if expanded.trim().is_empty() {
                        return Err(ConfigError::EnvVar {
                            var: raw_key,
                            provider: rp.name,
                            message: "API key expands to an empty value".to_string(),
                        });
                    }
                    (Some(ApiKey::from(expanded)), KeySource::EnvExpanded)
                }
                Some(raw_key) => (Some(ApiKey::from(raw_key)), KeySource::Literal),
                None => {
                    let var_name = convention_env_var_name(&rp.name);
                    match lookup(&var_name).filter(|v| !v.trim().is_empty()) {
                        Some(value) => (Some(ApiKey::from(value)), KeySource::Convention(var_name)),
                        None => (None, KeySource::None),
                    }
                }
            };

            if api_key.is_none() && rp.kind.requires_key() {
                return Err(ConfigError::MissingKey {
                    var: convention_env_var_name(&rp.name),
                    provider: rp.name,
                });
            }

            let url = match rp.url {
                Some(url) => expand_env_vars_with(&url, &rp.name, &lookup)?,
                None => rp.kind.default_url().unwrap_or_default().to_string(),
            };

            key_sources.push((rp.name.clone(), source));

            providers.push(ProviderConfig {
                name: rp.name,
                kind: rp.kind,
                url,
                api_key,
                default_model: rp.default_model,
                models: rp.models,
                headers: rp.headers,
            });
        }

        let config = Config {
            server: raw.server,
            routing: raw.routing,
            providers,
            logging: raw.logging,
        };

        Ok((config, key_sources))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::Validation(
                "At least one provider must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() || provider.name.contains('/') {
                return Err(ConfigError::Validation(format!(
                    "Provider name '{}' must be non-empty and must not contain '/'",
                    provider.name
                )));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' is configured more than once",
                    provider.name
                )));
            }
            if provider.url.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "Provider '{}' has empty URL",
                    provider.name
                )));
            }
            for (name, value) in &provider.headers {
                if axum::http::HeaderName::from_bytes(name.as_bytes()).is_err()
                    || axum::http::HeaderValue::from_str(value).is_err()
                {
                    return Err(ConfigError::Validation(format!(
                        "Provider '{}' has invalid header '{}'",
                        provider.name, name
                    )));
                }
            }
        }

        if self.provider(&self.routing.default_provider).is_none() {
            return Err(ConfigError::Validation(format!(
                "Default provider '{}' is not configured",
                self.routing.default_provider
            )));
        }

        if self.routing.default_model.is_empty() {
            return Err(ConfigError::Validation(
                "routing.default_model must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Look up a provider by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}
