//! Provider adapters
//!
//! Each adapter knows how one remote platform authorizes an account and how a
//! post is delivered to it. Adapters are registered once at startup in a
//! [`ProviderRegistry`] and looked up by their tag afterwards.
//!
//! ```no_run
//! use liblinkcast::config::Config;
//! use liblinkcast::providers::ProviderRegistry;
//!
//! # fn example() -> liblinkcast::error::Result<()> {
//! let config = Config::load()?;
//! let registry = ProviderRegistry::from_config(&config)?;
//!
//! if let Some(adapter) = registry.get("discord") {
//!     println!("{} is available", adapter.tag());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{AuthError, ConfigError, DeliveryError, Result};
use crate::types::{Credentials, LinkedIdentity};

pub mod discord;
pub mod linkedin;

// Available outside of tests so integration suites can register it
pub mod mock;

/// Longest provider response body carried into an error message
const MAX_ERROR_BODY: usize = 512;

/// Authorization material handed back by a provider callback
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    /// OAuth 2.0 authorization code
    AuthorizationCode { code: String },
    /// Incoming-webhook grant; `token` is the webhook secret
    Webhook {
        id: String,
        token: String,
        channel_id: Option<String>,
        guild_id: Option<String>,
    },
}

impl Grant {
    pub fn kind(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::Webhook { .. } => "webhook",
        }
    }
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Grant::AuthorizationCode { .. } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"[REDACTED]")
                .finish(),
            Grant::Webhook {
                id,
                channel_id,
                guild_id,
                ..
            } => f
                .debug_struct("Webhook")
                .field("id", id)
                .field("token", &"[REDACTED]")
                .field("channel_id", channel_id)
                .field("guild_id", guild_id)
                .finish(),
        }
    }
}

/// Provider acknowledgement of a delivered post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Id the provider assigned to the post, when it reports one
    pub provider_post_id: Option<String>,
}

/// Uniform interface over the platforms accounts can be linked to
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable lowercase tag (`linkedin`, `discord`)
    fn tag(&self) -> &str;

    /// Build the URL the browser is sent to, carrying `state` through the provider
    fn authorization_url(&self, state: &str) -> std::result::Result<String, AuthError>;

    /// Turn a callback grant into a remote identity with long-lived credentials
    async fn exchange_grant(&self, grant: Grant) -> std::result::Result<LinkedIdentity, AuthError>;

    /// Deliver `content` using stored credentials.
    ///
    /// Every failure, including transport errors and malformed responses, is
    /// reported as a [`DeliveryError`].
    async fn deliver(
        &self,
        credentials: &Credentials,
        content: &str,
    ) -> std::result::Result<Ack, DeliveryError>;
}

/// Registered adapters keyed by tag; read-only once built
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every enabled provider from configuration.
    ///
    /// Fails if an enabled provider has an endpoint or redirect URI that is not
    /// an absolute URL.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        if let Some(linkedin) = config.linkedin.as_ref().filter(|c| c.enabled) {
            check_url("linkedin.redirect_uri", &linkedin.redirect_uri)?;
            check_url("linkedin.authorization_endpoint", &linkedin.authorization_endpoint)?;
            check_url("linkedin.token_endpoint", &linkedin.token_endpoint)?;
            check_url("linkedin.userinfo_endpoint", &linkedin.userinfo_endpoint)?;
            check_url("linkedin.posts_endpoint", &linkedin.posts_endpoint)?;
            registry.register(Arc::new(linkedin::LinkedInAdapter::new(linkedin)));
        }

        if let Some(discord) = config.discord.as_ref().filter(|c| c.enabled) {
            check_url("discord.redirect_uri", &discord.redirect_uri)?;
            check_url("discord.authorization_endpoint", &discord.authorization_endpoint)?;
            check_url("discord.webhook_base", &discord.webhook_base)?;
            registry.register(Arc::new(discord::DiscordAdapter::new(discord)));
        }

        tracing::info!(providers = ?registry.tags(), "Provider registry built");
        Ok(registry)
    }

    /// Add an adapter, replacing any previous one with the same tag
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.tag().to_string(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.adapters.contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.adapters.keys().cloned().collect();
        tags.sort();
        tags
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.tags())
            .finish()
    }
}

fn check_url(field: &str, value: &str) -> Result<()> {
    reqwest::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{} is not a valid URL ({}): {}", field, e, value)))?;
    Ok(())
}

/// Map a failed delivery response to the error taxonomy
pub(crate) fn rejection(status: reqwest::StatusCode, body: String) -> DeliveryError {
    let body = truncate(body);
    match status.as_u16() {
        401 | 403 => DeliveryError::Unauthorized(format!("HTTP {}: {}", status.as_u16(), body)),
        code => DeliveryError::ProviderRejected { status: code, body },
    }
}

/// Map a transport-level failure during delivery
pub(crate) fn transport_failure(error: reqwest::Error) -> DeliveryError {
    if error.is_decode() {
        DeliveryError::MalformedResponse(error.to_string())
    } else {
        DeliveryError::NetworkFailure(error.without_url().to_string())
    }
}

pub(crate) fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
