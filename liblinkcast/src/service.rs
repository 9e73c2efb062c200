//! Service facade for Linkcast
//!
//! `LinkcastService` owns the shared pieces (store, provider registry,
//! correlator, event bus) and exposes the operations the HTTP layer and
//! embedders need.
//!
//! ```no_run
//! use liblinkcast::config::Config;
//! use liblinkcast::service::LinkcastService;
//!
//! # async fn example() -> liblinkcast::Result<()> {
//! let config = Config::load()?;
//! let service = LinkcastService::from_config(&config).await?;
//!
//! let report = service.publish_post("3f6c…").await?;
//! println!("{} -> {}", report.post_id, report.status);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::{resolve_db_path, Config};
use crate::correlation::{AuthorizationCorrelator, LinkIntent};
use crate::db::Database;
use crate::dispatcher::PublishingDispatcher;
use crate::error::{LinkError, LinkcastError, Result};
use crate::events::{EventBus, EventReceiver};
use crate::linking::{CallbackHandler, LinkResult, ProviderResponse, RedirectTargets};
use crate::providers::ProviderRegistry;
use crate::store::{AccountLinkStore, PostStore};
use crate::types::{AccountStatus, Post, PostStatus, PublishOutcome, PublishRecord, SocialAccount};

/// What one publish attempt did to a post
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub post_id: String,
    /// Post status after the attempt
    pub status: PostStatus,
    pub outcomes: Vec<PublishOutcome>,
}

/// Status a post moves to after a publish attempt.
///
/// PUBLISHED only when there was at least one target and every target
/// succeeded; otherwise the status is left alone so the failures can be
/// fixed and the post published again.
pub fn status_after_publish(current: PostStatus, outcomes: &[PublishOutcome]) -> PostStatus {
    if !outcomes.is_empty() && outcomes.iter().all(|o| o.success) {
        PostStatus::Published
    } else {
        current
    }
}

pub struct LinkcastService {
    accounts: Arc<dyn AccountLinkStore>,
    posts: Arc<dyn PostStore>,
    registry: Arc<ProviderRegistry>,
    linking: CallbackHandler,
    dispatcher: PublishingDispatcher,
    event_bus: EventBus,
}

impl LinkcastService {
    /// Build every component from configuration, opening the SQLite store
    pub async fn from_config(config: &Config) -> Result<Self> {
        let db_path = resolve_db_path(&config.database.path);
        let db_path = db_path.to_str().ok_or_else(|| {
            LinkcastError::InvalidInput("database path is not valid UTF-8".to_string())
        })?;
        let store = Arc::new(Database::new(db_path).await?);

        let correlator = match config.links.state_secret.as_deref() {
            Some(secret) => AuthorizationCorrelator::with_secret(secret.as_bytes(), config.state_ttl())?,
            None => {
                warn!("No state secret configured; pending links will not survive a restart");
                AuthorizationCorrelator::new(config.state_ttl())
            }
        };

        let registry = ProviderRegistry::from_config(config)?;
        if registry.is_empty() {
            warn!("No providers are enabled in configuration");
        }

        Ok(Self::new(
            store,
            registry,
            correlator,
            RedirectTargets {
                success: config.links.success_redirect.clone(),
                error: config.links.error_redirect.clone(),
            },
            config.delivery_timeout(),
        ))
    }

    /// Assemble a service around any store implementing both contracts
    pub fn new<S>(
        store: Arc<S>,
        registry: ProviderRegistry,
        correlator: AuthorizationCorrelator,
        redirects: RedirectTargets,
        timeout: Duration,
    ) -> Self
    where
        S: AccountLinkStore + PostStore + 'static,
    {
        let accounts: Arc<dyn AccountLinkStore> = store.clone();
        let posts: Arc<dyn PostStore> = store;
        let registry = Arc::new(registry);
        let event_bus = EventBus::new(100);

        let linking = CallbackHandler::new(
            Arc::new(correlator),
            Arc::clone(&registry),
            Arc::clone(&accounts),
            redirects,
        )
        .with_exchange_timeout(timeout)
        .with_events(event_bus.clone());

        let dispatcher = PublishingDispatcher::new(Arc::clone(&registry), Arc::clone(&accounts), timeout)
            .with_events(event_bus.clone());

        Self {
            accounts,
            posts,
            registry,
            linking,
            dispatcher,
            event_bus,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn providers(&self) -> Vec<String> {
        self.registry.tags()
    }

    pub async fn begin_link(&self, intent: LinkIntent) -> std::result::Result<String, LinkError> {
        self.linking.begin_link(intent).await
    }

    pub async fn complete_link(&self, response: ProviderResponse) -> LinkResult {
        self.linking.complete_link(response).await
    }

    pub fn reject_callback(&self, reason: impl Into<String>) -> LinkResult {
        self.linking.reject_callback(reason)
    }

    /// Publish a stored post to all of its targets and apply the status policy
    pub async fn publish_post(&self, post_id: &str) -> Result<PublishReport> {
        let post = self
            .posts
            .get_post(post_id)
            .await?
            .ok_or_else(|| LinkcastError::NotFound(format!("post {}", post_id)))?;

        let outcomes = self.dispatcher.publish(&post).await;

        if let Err(e) = self.posts.record_outcomes(&post.id, &outcomes).await {
            warn!(post_id = %post.id, "Failed to record publish outcomes: {}", e);
        }

        let status = status_after_publish(post.status, &outcomes);
        if status != post.status {
            self.posts.update_post_status(&post.id, status).await?;
        }

        Ok(PublishReport {
            post_id: post.id,
            status,
            outcomes,
        })
    }

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        if post.content.trim().is_empty() {
            return Err(LinkcastError::InvalidInput(
                "post content cannot be empty".to_string(),
            ));
        }
        self.posts.create_post(post).await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        self.posts.get_post(post_id).await
    }

    pub async fn publish_history(&self, post_id: &str) -> Result<Vec<PublishRecord>> {
        self.posts.get_publish_records(post_id).await
    }

    /// Create a DISCONNECTED account to be linked later
    pub async fn create_account(
        &self,
        provider: &str,
        name: &str,
        workspace_id: Option<String>,
    ) -> Result<SocialAccount> {
        if !self.registry.contains(provider) {
            return Err(LinkcastError::InvalidInput(format!(
                "unknown provider '{}'",
                provider
            )));
        }
        if name.trim().is_empty() {
            return Err(LinkcastError::InvalidInput(
                "account name cannot be empty".to_string(),
            ));
        }

        let mut account = SocialAccount::new(provider, name.trim());
        account.workspace_id = workspace_id;
        self.accounts.create_account(&account).await?;
        Ok(account)
    }

    pub async fn find_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        self.accounts.find_account(account_id).await
    }

    pub async fn disconnect_account(&self, account_id: &str) -> Result<SocialAccount> {
        self.accounts
            .mark_status(account_id, AccountStatus::Disconnected)
            .await
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        self.accounts.delete_account(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;

    #[test]
    fn test_status_after_publish_requires_every_success() {
        let ok = PublishOutcome::delivered("a", "discord", None);
        let failed = PublishOutcome::failed("b", "linkedin", DeliveryError::Unauthorized("x".into()));

        assert_eq!(
            status_after_publish(PostStatus::Approved, &[ok.clone()]),
            PostStatus::Published
        );
        assert_eq!(
            status_after_publish(PostStatus::Approved, &[ok, failed]),
            PostStatus::Approved
        );
        assert_eq!(
            status_after_publish(PostStatus::Scheduled, &[]),
            PostStatus::Scheduled
        );
    }
}
