use anyhow::{Context, Result};
use chrono::Duration;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Upper bounds keeping the configured lifetimes within chrono's `Duration` range
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 366;
const MAX_RESET_TOKEN_TTL_MINUTES: i64 = 24 * 60 * 7;
const MAX_CONFLICT_WINDOW_MINUTES: i64 = 24 * 60 * 7;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory of frontend assets served for any non-API path
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing tokens. Empty means "generate one per process".
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,
    /// Admin account created at startup if no user has this email
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
            reset_token_ttl_minutes: default_reset_token_ttl_minutes(),
            admin_email: None,
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::minutes(self.reset_token_ttl_minutes)
    }

    /// Fill in a random signing secret when none was configured.
    ///
    /// Call after logging is set up so the warning is visible.
    pub fn ensure_jwt_secret(&mut self) {
        if self.jwt_secret.is_empty() {
            warn!("No auth.jwt_secret configured; generated a random one. Tokens will not survive a restart");
            self.jwt_secret = hex::encode(rand::random::<[u8; 32]>());
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_reset_token_ttl_minutes() -> i64 {
    60
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Half-width of the window around a session start in which a user's
    /// other active sessions count as conflicts
    #[serde(default = "default_conflict_window_minutes")]
    pub conflict_window_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            conflict_window_minutes: default_conflict_window_minutes(),
        }
    }
}

impl SchedulingConfig {
    pub fn conflict_window(&self) -> Duration {
        Duration::minutes(self.conflict_window_minutes)
    }
}

fn default_conflict_window_minutes() -> i64 {
    crate::scheduling::DEFAULT_CONFLICT_WINDOW_MINUTES
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
    /// Read and validate the config file, or fall back to defaults when it is
    /// missing. An empty `auth.jwt_secret` is left for [`AuthConfig::ensure_jwt_secret`].
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    fn validate(&self) -> Result<()> {
        if !(0..=MAX_CONFLICT_WINDOW_MINUTES).contains(&self.scheduling.conflict_window_minutes) {
            anyhow::bail!(
                "scheduling.conflict_window_minutes must be between 0 and {}",
                MAX_CONFLICT_WINDOW_MINUTES
            );
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.auth.token_ttl_hours) {
            anyhow::bail!("auth.token_ttl_hours must be between 1 and {}", MAX_TOKEN_TTL_HOURS);
        }
        if !(1..=MAX_RESET_TOKEN_TTL_MINUTES).contains(&self.auth.reset_token_ttl_minutes) {
            anyhow::bail!(
                "auth.reset_token_ttl_minutes must be between 1 and {}",
                MAX_RESET_TOKEN_TTL_MINUTES
            );
        }
        if self.auth.admin_email.is_some() != self.auth.admin_password.is_some() {
            anyhow::bail!("auth.admin_email and auth.admin_password must be set together");
        }
        Ok(())
    }
}
