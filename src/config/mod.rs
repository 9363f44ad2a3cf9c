use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Holds the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Built front-end served as a fallback when the directory exists
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Origins allowed to make credentialed cross-origin requests
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("frontend/dist")
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

/// How callers prove who they are
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthStrategy {
    /// Opaque tokens issued by `/api/login`
    #[default]
    Session,
    /// HMAC-signed tokens issued by an external identity provider
    External,
}

impl std::str::FromStr for AuthStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "external" | "jwt" => Ok(Self::External),
            _ => Err(format!("Unknown auth strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub strategy: AuthStrategy,
    /// Maximum number of locally registered accounts
    #[serde(default = "default_max_users")]
    pub max_users: u32,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
    /// Shared secret of the external identity provider
    pub jwt_secret: Option<String>,
    /// Expected `aud` claim of external tokens, if any
    pub jwt_audience: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            strategy: AuthStrategy::default(),
            max_users: default_max_users(),
            session_ttl_days: default_session_ttl_days(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
            jwt_secret: None,
            jwt_audience: None,
        }
    }
}

fn default_max_users() -> u32 {
    3
}

/// Ten years
const MAX_SESSION_TTL_DAYS: i64 = 3650;

fn default_session_ttl_days() -> i64 {
    7
}

fn default_cookie_name() -> String {
    "poppo_session".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// API key of the text generation service; chat fails without it
    pub api_key: Option<String>,
    #[serde(default = "default_chat_api_url")]
    pub api_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Upper bound on the length of a generated reply
    #[serde(default = "default_chat_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_chat_api_url(),
            model: default_chat_model(),
            max_tokens: default_chat_max_tokens(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

fn default_chat_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chat_max_tokens() -> u32 {
    100
}

fn default_chat_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
    /// Largest accepted image, in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_file_bytes() -> usize {
    10 << 20
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load the TOML file (defaults when it does not exist), apply
    /// environment overrides and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the environment variables the service has always honoured.
    ///
    /// `lookup` stands in for `std::env::var` so overrides can be tested
    /// without touching the process environment.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
            self.server.port = port
                .trim_start_matches(':')
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }

        if let Some(max) = lookup("MAX_USERS") {
            // Ignored unless it is a positive number
            match max.parse::<u32>() {
                Ok(n) if n > 0 => self.auth.max_users = n,
                _ => tracing::warn!("Ignoring invalid MAX_USERS value: {}", max),
            }
        }

        if let Some(origins) = lookup("CORS_ORIGINS").filter(|v| !v.is_empty()) {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(strategy) = lookup("POPPO_AUTH_STRATEGY").filter(|v| !v.is_empty()) {
            self.auth.strategy = strategy.parse().map_err(anyhow::Error::msg)?;
        }

        if let Some(secret) = lookup("SUPABASE_JWT_SECRET").filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.chat.api_key = Some(key);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.max_users == 0 {
            bail!("auth.max_users must be at least 1");
        }
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.auth.session_ttl_days) {
            bail!(
                "auth.session_ttl_days must be between 1 and {}",
                MAX_SESSION_TTL_DAYS
            );
        }
        if self.auth.cookie_name.is_empty() {
            bail!("auth.cookie_name must not be empty");
        }
        if self.auth.strategy == AuthStrategy::External
            && self.auth.jwt_secret.as_deref().map_or(true, str::is_empty)
        {
            bail!("auth.strategy = \"external\" requires auth.jwt_secret (or SUPABASE_JWT_SECRET)");
        }
        if self.uploads.max_file_bytes == 0 {
            bail!("uploads.max_file_bytes must be positive");
        }
        if self.chat.timeout_secs == 0 {
            bail!("chat.timeout_secs must be positive");
        }
        Ok(())
    }
}
