//! Configuration management for Linkcast
//!
//! Configuration is read from a TOML file. Client secrets may be left out of
//! the file and supplied through environment variables instead:
//!
//! - `LINKCAST_LINKEDIN_CLIENT_SECRET`
//! - `LINKCAST_STATE_SECRET`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Allowed range for the correlation token lifetime, in seconds
pub const STATE_TTL_RANGE: std::ops::RangeInclusive<u64> = 60..=3600;

/// Allowed range for the per-delivery timeout, in seconds
pub const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=120;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    pub linkedin: Option<LinkedInConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Account-linking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Where the browser lands after a successful link
    #[serde(default = "default_success_redirect")]
    pub success_redirect: String,
    /// Where the browser lands after a failed link (`?error=<code>` is appended)
    #[serde(default = "default_error_redirect")]
    pub error_redirect: String,
    /// Lifetime of a correlation token
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
    /// HMAC key for correlation tokens; random per process when absent
    #[serde(default)]
    pub state_secret: Option<String>,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            success_redirect: default_success_redirect(),
            error_redirect: default_error_redirect(),
            state_ttl_secs: default_state_ttl(),
            state_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Per-delivery timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub enabled: bool,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Must match byte-for-byte the URI registered with LinkedIn
    pub redirect_uri: String,
    #[serde(default = "default_linkedin_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_linkedin_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_linkedin_userinfo_endpoint")]
    pub userinfo_endpoint: String,
    #[serde(default = "default_linkedin_posts_endpoint")]
    pub posts_endpoint: String,
    #[serde(default = "default_linkedin_scope")]
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default = "default_discord_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_discord_scope")]
    pub scope: String,
    #[serde(default = "default_discord_webhook_base")]
    pub webhook_base: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_success_redirect() -> String {
    "http://localhost:3000/dashboard/settings/channels".to_string()
}

fn default_error_redirect() -> String {
    "http://localhost:3000/dashboard/settings/channels".to_string()
}

fn default_state_ttl() -> u64 {
    600
}

fn default_timeout() -> u64 {
    20
}

fn default_linkedin_authorization_endpoint() -> String {
    "https://www.linkedin.com/oauth/v2/authorization".to_string()
}

fn default_linkedin_token_endpoint() -> String {
    "https://www.linkedin.com/oauth/v2/accessToken".to_string()
}

fn default_linkedin_userinfo_endpoint() -> String {
    "https://api.linkedin.com/v2/userinfo".to_string()
}

fn default_linkedin_posts_endpoint() -> String {
    "https://api.linkedin.com/v2/ugcPosts".to_string()
}

fn default_linkedin_scope() -> String {
    "openid profile w_member_social".to_string()
}

fn default_discord_authorization_endpoint() -> String {
    "https://discord.com/oauth2/authorize".to_string()
}

fn default_discord_scope() -> String {
    "webhook.incoming".to_string()
}

fn default_discord_webhook_base() -> String {
    "https://discord.com/api/webhooks".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Fill secrets from the environment where set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("LINKCAST_LINKEDIN_CLIENT_SECRET") {
            if let Some(linkedin) = self.linkedin.as_mut() {
                linkedin.client_secret = secret;
            }
        }
        if let Ok(secret) = std::env::var("LINKCAST_STATE_SECRET") {
            self.links.state_secret = Some(secret);
        }
    }

    /// Check the configuration for values the services cannot work with
    pub fn validate(&self) -> Result<()> {
        if !STATE_TTL_RANGE.contains(&self.links.state_ttl_secs) {
            return Err(ConfigError::Invalid(format!(
                "links.state_ttl_secs must be between {} and {} (got {})",
                STATE_TTL_RANGE.start(),
                STATE_TTL_RANGE.end(),
                self.links.state_ttl_secs
            ))
            .into());
        }

        if !TIMEOUT_RANGE.contains(&self.publishing.timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "publishing.timeout_secs must be between {} and {} (got {})",
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end(),
                self.publishing.timeout_secs
            ))
            .into());
        }

        if let Some(secret) = &self.links.state_secret {
            if secret.len() < 16 {
                return Err(ConfigError::Invalid(
                    "links.state_secret must be at least 16 bytes".to_string(),
                )
                .into());
            }
        }

        if let Some(linkedin) = self.linkedin.as_ref().filter(|l| l.enabled) {
            if linkedin.client_id.trim().is_empty() {
                return Err(ConfigError::MissingField("linkedin.client_id".to_string()).into());
            }
            if linkedin.client_secret.trim().is_empty() {
                return Err(ConfigError::MissingField(
                    "linkedin.client_secret (or LINKCAST_LINKEDIN_CLIENT_SECRET)".to_string(),
                )
                .into());
            }
            if linkedin.redirect_uri.trim().is_empty() {
                return Err(ConfigError::MissingField("linkedin.redirect_uri".to_string()).into());
            }
        }

        if let Some(discord) = self.discord.as_ref().filter(|d| d.enabled) {
            if discord.client_id.trim().is_empty() {
                return Err(ConfigError::MissingField("discord.client_id".to_string()).into());
            }
            if discord.redirect_uri.trim().is_empty() {
                return Err(ConfigError::MissingField("discord.redirect_uri".to_string()).into());
            }
        }

        Ok(())
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/linkcast/linkcast.db".to_string(),
            },
            server: ServerConfig::default(),
            links: LinksConfig::default(),
            publishing: PublishingConfig::default(),
            linkedin: None,
            discord: None,
        }
    }

    pub fn state_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.links.state_ttl_secs)
    }

    pub fn delivery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.publishing.timeout_secs)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LINKCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("linkcast").join("config.toml"))
}

/// Expand `~` in the configured database path
pub fn resolve_db_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
