//! Fan-out of one post to every account it targets
//!
//! Each target is delivered in its own spawned task with its own timeout, so a
//! slow or failing provider never holds up or aborts its siblings. Because the
//! tasks are spawned, dropping the `publish` future does not cancel deliveries
//! that are already in flight.
//!
//! The dispatcher never retries and never writes post status. Deciding what
//! the outcomes mean for the post is left to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::events::{Event, EventBus};
use crate::providers::ProviderRegistry;
use crate::store::AccountLinkStore;
use crate::types::{Post, PublishOutcome};

/// Provider label used when the target account could not be loaded
const UNKNOWN_PROVIDER: &str = "unknown";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct PublishingDispatcher {
    registry: Arc<ProviderRegistry>,
    accounts: Arc<dyn AccountLinkStore>,
    timeout: Duration,
    events: Option<EventBus>,
}

impl PublishingDispatcher {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        accounts: Arc<dyn AccountLinkStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            accounts,
            timeout,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Deliver `post` to every target.
    ///
    /// Returns exactly one outcome per target, in target order.
    pub async fn publish(&self, post: &Post) -> Vec<PublishOutcome> {
        info!(post_id = %post.id, targets = post.targets.len(), "Publishing post");
        self.emit(Event::PublishStarted {
            post_id: post.id.clone(),
            targets: post.targets.len(),
        });

        let content: Arc<str> = Arc::from(post.content.as_str());

        let handles: Vec<_> = post
            .targets
            .iter()
            .map(|account_id| {
                let registry = Arc::clone(&self.registry);
                let accounts = Arc::clone(&self.accounts);
                let content = Arc::clone(&content);
                let account_id = account_id.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    deliver_to(&registry, accounts.as_ref(), &account_id, &content, timeout).await
                })
            })
            .collect();

        let outcomes: Vec<PublishOutcome> = join_all(handles)
            .await
            .into_iter()
            .zip(&post.targets)
            .map(|(joined, account_id)| {
                joined.unwrap_or_else(|e| {
                    warn!(post_id = %post.id, account_id = %account_id, "Delivery task failed: {}", e);
                    PublishOutcome::failed(
                        account_id.as_str(),
                        UNKNOWN_PROVIDER,
                        DeliveryError::Internal(format!("delivery task failed: {}", e)),
                    )
                })
            })
            .collect();

        for outcome in &outcomes {
            self.emit(Event::TargetDelivered {
                post_id: post.id.clone(),
                account_id: outcome.account_id.clone(),
                provider: outcome.provider.clone(),
                success: outcome.success,
                error: outcome.error.as_ref().map(|e| e.kind().to_string()),
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        info!(
            post_id = %post.id,
            succeeded,
            failed = outcomes.len() - succeeded,
            "Publish finished"
        );
        self.emit(Event::PublishCompleted {
            post_id: post.id.clone(),
            succeeded,
            failed: outcomes.len() - succeeded,
        });

        outcomes
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

/// Run every precondition and the delivery for one target
async fn deliver_to(
    registry: &ProviderRegistry,
    accounts: &dyn AccountLinkStore,
    account_id: &str,
    content: &str,
    timeout: Duration,
) -> PublishOutcome {
    let account = match accounts.find_account(account_id).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return PublishOutcome::failed(
                account_id,
                UNKNOWN_PROVIDER,
                DeliveryError::AccountUnavailable(format!("account {} does not exist", account_id)),
            )
        }
        Err(e) => {
            return PublishOutcome::failed(
                account_id,
                UNKNOWN_PROVIDER,
                DeliveryError::AccountUnavailable(e.to_string()),
            )
        }
    };

    let provider = account.provider.as_str();

    let credentials = match account.credentials.as_ref() {
        Some(credentials) if account.is_connected() => credentials,
        _ => {
            return PublishOutcome::failed(
                account_id,
                provider,
                DeliveryError::Unauthorized("account is not connected".to_string()),
            )
        }
    };

    if credentials.is_expired(Utc::now()) {
        return PublishOutcome::failed(
            account_id,
            provider,
            DeliveryError::Unauthorized("stored credentials have expired".to_string()),
        );
    }

    let Some(adapter) = registry.get(provider) else {
        return PublishOutcome::failed(
            account_id,
            provider,
            DeliveryError::UnsupportedProvider(provider.to_string()),
        );
    };

    debug!(account_id = %account_id, provider = %provider, "Delivering to target");

    match tokio::time::timeout(timeout, adapter.deliver(credentials, content)).await {
        Ok(Ok(ack)) => {
            info!(account_id = %account_id, provider = %provider, "Delivered");
            PublishOutcome::delivered(account_id, provider, ack.provider_post_id)
        }
        Ok(Err(e)) => {
            warn!(account_id = %account_id, provider = %provider, kind = e.kind(), "Delivery failed: {}", e);
            PublishOutcome::failed(account_id, provider, e)
        }
        Err(_) => {
            warn!(account_id = %account_id, provider = %provider, "Delivery timed out");
            PublishOutcome::failed(
                account_id,
                provider,
                DeliveryError::NetworkFailure(format!(
                    "no response within {}s",
                    timeout.as_secs_f32()
                )),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::store::MemoryStore;
    use crate::types::{Credentials, LinkedIdentity, SocialAccount};

    async fn connected(store: &MemoryStore, provider: &str, credentials: Credentials) -> String {
        let mut account = SocialAccount::new(provider, provider);
        account.connect(LinkedIdentity {
            provider_account_id: format!("{}-{}", provider, uuid::Uuid::new_v4()),
            display_name: provider.to_string(),
            credentials,
        });
        store.create_account(&account).await.unwrap();
        account.id
    }

    fn dispatcher(registry: ProviderRegistry, store: Arc<MemoryStore>) -> PublishingDispatcher {
        PublishingDispatcher::new(Arc::new(registry), store, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_target_set() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(ProviderRegistry::new(), store);

        let outcomes = dispatcher.publish(&Post::new("Hello".to_string())).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_one_outcome_per_target_in_order() {
        let store = Arc::new(MemoryStore::new());
        let ok = connected(&store, "discord", Credentials::new("url")).await;
        let failing = connected(&store, "linkedin", Credentials::new("token")).await;
        let orphan = "no-such-account".to_string();

        let registry = ProviderRegistry::new()
            .with(Arc::new(MockProvider::success("discord")))
            .with(Arc::new(MockProvider::deliver_failure(
                "linkedin",
                DeliveryError::ProviderRejected {
                    status: 500,
                    body: "oops".into(),
                },
            )));

        let post = Post::new("Hello".to_string()).with_targets([
            failing.clone(),
            orphan.clone(),
            ok.clone(),
        ]);
        let outcomes = dispatcher(registry, store).publish(&post).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].account_id, failing);
        assert!(!outcomes[0].success);
        assert_eq!(outcomes[1].account_id, orphan);
        assert_eq!(
            outcomes[1].error.as_ref().unwrap().kind(),
            "account_unavailable"
        );
        assert_eq!(outcomes[2].account_id, ok);
        assert!(outcomes[2].success);
        assert!(outcomes[2].provider_post_id.is_some());
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_unsupported() {
        let store = Arc::new(MemoryStore::new());
        let id = connected(&store, "mastodon", Credentials::new("t")).await;

        let post = Post::new("Hello".to_string()).with_targets([id]);
        let outcomes = dispatcher(ProviderRegistry::new(), store).publish(&post).await;

        assert_eq!(
            outcomes[0].error,
            Some(DeliveryError::UnsupportedProvider("mastodon".into()))
        );
    }

    #[tokio::test]
    async fn test_disconnected_and_expired_are_unauthorized_without_calls() {
        let store = Arc::new(MemoryStore::new());
        let expired = connected(
            &store,
            "linkedin",
            Credentials::new("t").with_expiry(Some(Utc::now() - chrono::Duration::minutes(1))),
        )
        .await;
        let disconnected = SocialAccount::new("linkedin", "Fresh");
        store.create_account(&disconnected).await.unwrap();

        let provider = Arc::new(MockProvider::success("linkedin"));
        let registry = ProviderRegistry::new().with(provider.clone());

        let post = Post::new("Hello".to_string()).with_targets([expired, disconnected.id]);
        let outcomes = dispatcher(registry, store).publish(&post).await;

        assert!(outcomes
            .iter()
            .all(|o| o.error.as_ref().map(|e| e.kind()) == Some("unauthorized")));
        assert_eq!(provider.deliver_call_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_network_failure() {
        let store = Arc::new(MemoryStore::new());
        let slow = connected(&store, "discord", Credentials::new("url")).await;
        let fast = connected(&store, "linkedin", Credentials::new("t")).await;

        let registry = ProviderRegistry::new()
            .with(Arc::new(MockProvider::with_delay(
                "discord",
                Duration::from_secs(10),
            )))
            .with(Arc::new(MockProvider::success("linkedin")));
        let dispatcher =
            PublishingDispatcher::new(Arc::new(registry), store, Duration::from_millis(100));

        let post = Post::new("Hello".to_string()).with_targets([slow, fast]);
        let outcomes = dispatcher.publish(&post).await;

        assert_eq!(
            outcomes[0].error.as_ref().map(|e| e.kind()),
            Some("network_failure")
        );
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn test_targets_run_concurrently() {
        let store = Arc::new(MemoryStore::new());
        let mut targets = Vec::new();
        for _ in 0..3 {
            targets.push(connected(&store, "discord", Credentials::new("url")).await);
        }

        let registry = ProviderRegistry::new().with(Arc::new(MockProvider::with_delay(
            "discord",
            Duration::from_millis(200),
        )));

        let start = std::time::Instant::now();
        let outcomes = dispatcher(registry, store)
            .publish(&Post::new("Hello".to_string()).with_targets(targets))
            .await;

        assert!(outcomes.iter().all(|o| o.success));
        assert!(start.elapsed() < Duration::from_millis(550));
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let store = Arc::new(MemoryStore::new());
        let id = connected(&store, "discord", Credentials::new("url")).await;
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        let registry = ProviderRegistry::new().with(Arc::new(MockProvider::success("discord")));
        let post = Post::new("Hello".to_string()).with_targets([id]);
        dispatcher(registry, store)
            .with_events(bus)
            .publish(&post)
            .await;

        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::PublishStarted { targets: 1, .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::TargetDelivered { success: true, .. }
        ));
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::PublishCompleted {
                succeeded: 1,
                failed: 0,
                ..
            }
        ));
    }
}
