//! Mock provider for testing
//!
//! A configurable adapter that can succeed, fail or stall on either the grant
//! exchange or delivery, and records how it was called. Integration tests use
//! it to exercise linking and fan-out without network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{Ack, Grant, ProviderAdapter};
use crate::error::{AuthError, DeliveryError};
use crate::types::{Credentials, LinkedIdentity};

/// Configuration for mock provider behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Provider tag (e.g. "discord", "mock-linkedin")
    pub tag: String,

    /// Remote identity returned for authorization-code grants
    pub identity: String,

    /// Error returned from `exchange_grant`, if any
    pub exchange_error: Option<AuthError>,

    /// Error returned from `deliver`, if any
    pub deliver_error: Option<DeliveryError>,

    /// Delay before `deliver` completes (simulates network latency)
    pub delay: Duration,

    /// Delay before `exchange_grant` completes
    pub exchange_delay: Duration,

    pub exchange_call_count: Arc<Mutex<usize>>,
    pub deliver_call_count: Arc<Mutex<usize>>,

    /// Content passed to successful deliveries
    pub delivered_content: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            tag: "mock".to_string(),
            identity: "mock-user".to_string(),
            exchange_error: None,
            deliver_error: None,
            delay: Duration::ZERO,
            exchange_delay: Duration::ZERO,
            exchange_call_count: Arc::new(Mutex::new(0)),
            deliver_call_count: Arc::new(Mutex::new(0)),
            delivered_content: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockProvider {
    config: MockConfig,
}

impl MockProvider {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// A provider whose exchange and delivery always succeed
    pub fn success(tag: &str) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            ..Default::default()
        })
    }

    /// Authorization codes resolve to `identity`
    pub fn with_identity(tag: &str, identity: &str) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            identity: identity.to_string(),
            ..Default::default()
        })
    }

    pub fn exchange_failure(tag: &str, error: AuthError) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            exchange_error: Some(error),
            ..Default::default()
        })
    }

    pub fn deliver_failure(tag: &str, error: DeliveryError) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            deliver_error: Some(error),
            ..Default::default()
        })
    }

    pub fn with_delay(tag: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// A provider whose token endpoint takes `delay` to answer
    pub fn with_exchange_delay(tag: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            tag: tag.to_string(),
            exchange_delay: delay,
            ..Default::default()
        })
    }

    pub fn exchange_call_count(&self) -> usize {
        *lock(&self.config.exchange_call_count)
    }

    pub fn deliver_call_count(&self) -> usize {
        *lock(&self.config.deliver_call_count)
    }

    pub fn delivered_content(&self) -> Vec<String> {
        lock(&self.config.delivered_content).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn tag(&self) -> &str {
        &self.config.tag
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        Ok(format!(
            "https://{}.example.test/authorize?state={}",
            self.config.tag, state
        ))
    }

    async fn exchange_grant(&self, grant: Grant) -> Result<LinkedIdentity, AuthError> {
        *lock(&self.config.exchange_call_count) += 1;

        if !self.config.exchange_delay.is_zero() {
            sleep(self.config.exchange_delay).await;
        }

        if let Some(error) = &self.config.exchange_error {
            return Err(error.clone());
        }

        let (provider_account_id, access_token) = match grant {
            Grant::AuthorizationCode { code } => {
                (self.config.identity.clone(), format!("mock-token-{}", code))
            }
            Grant::Webhook { id, token, .. } => {
                let url = format!("https://{}.example.test/hooks/{}/{}", self.config.tag, id, token);
                (id, url)
            }
        };

        Ok(LinkedIdentity {
            display_name: format!("{} ({})", self.config.tag, provider_account_id),
            provider_account_id,
            credentials: Credentials::new(access_token),
        })
    }

    async fn deliver(&self, _credentials: &Credentials, content: &str) -> Result<Ack, DeliveryError> {
        *lock(&self.config.deliver_call_count) += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.deliver_error {
            return Err(error.clone());
        }

        lock(&self.config.delivered_content).push(content.to_string());

        Ok(Ack {
            provider_post_id: Some(format!("{}:mock-{}", self.config.tag, uuid::Uuid::new_v4())),
        })
    }
}
