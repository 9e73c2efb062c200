//! Integration tests for publishing a post to several linked accounts

use std::sync::Arc;
use std::time::Duration;

use liblinkcast::config::{DiscordConfig, LinkedInConfig};
use liblinkcast::error::DeliveryError;
use liblinkcast::events::Event;
use liblinkcast::linking::RedirectTargets;
use liblinkcast::providers::discord::DiscordAdapter;
use liblinkcast::providers::linkedin::LinkedInAdapter;
use liblinkcast::types::{Credentials, LinkedIdentity};
use liblinkcast::{
    AccountLinkStore, AuthorizationCorrelator, LinkcastService, MemoryStore, Post, PostStatus,
    PostStore, ProviderRegistry, SocialAccount,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry_for(server: &MockServer) -> ProviderRegistry {
    let linkedin = LinkedInConfig {
        enabled: true,
        client_id: "li-client".to_string(),
        client_secret: "li-secret".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        authorization_endpoint: format!("{}/oauth/v2/authorization", server.uri()),
        token_endpoint: format!("{}/oauth/v2/accessToken", server.uri()),
        userinfo_endpoint: format!("{}/v2/userinfo", server.uri()),
        posts_endpoint: format!("{}/v2/ugcPosts", server.uri()),
        scope: "openid profile w_member_social".to_string(),
    };
    let discord = DiscordConfig {
        enabled: true,
        client_id: "dc-client".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        authorization_endpoint: format!("{}/oauth2/authorize", server.uri()),
        scope: "webhook.incoming".to_string(),
        webhook_base: format!("{}/api/webhooks", server.uri()),
    };

    ProviderRegistry::new()
        .with(Arc::new(LinkedInAdapter::new(&linkedin)))
        .with(Arc::new(DiscordAdapter::new(&discord)))
}

fn service_with(store: Arc<MemoryStore>, registry: ProviderRegistry) -> LinkcastService {
    LinkcastService::new(
        store,
        registry,
        AuthorizationCorrelator::new(Duration::from_secs(600)),
        RedirectTargets {
            success: "https://app.example.com/channels".to_string(),
            error: "https://app.example.com/channels".to_string(),
        },
        Duration::from_secs(5),
    )
}

async fn connected_account(
    store: &MemoryStore,
    provider: &str,
    remote_id: &str,
    token: String,
) -> SocialAccount {
    let mut account = SocialAccount::new(provider, provider);
    account.connect(LinkedIdentity {
        provider_account_id: remote_id.to_string(),
        display_name: format!("{} account", provider),
        credentials: Credentials::new(token),
    });
    store.upsert_account(&account).await.unwrap();
    account
}

#[tokio::test]
async fn test_mixed_publish_reports_each_target() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/W1/T1"))
        .and(query_param("wait", "true"))
        .and(body_json(json!({"content": "Launch day"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-1"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/userinfo"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token revoked"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/ugcPosts"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let discord = connected_account(
        &store,
        "discord",
        "W1",
        format!("{}/api/webhooks/W1/T1", server.uri()),
    )
    .await;
    let linkedin = connected_account(&store, "linkedin", "member-1", "revoked".to_string()).await;

    let service = service_with(store.clone(), registry_for(&server));
    let mut events = service.subscribe();

    let mut post = Post::new("Launch day".to_string())
        .with_targets([discord.id.clone(), linkedin.id.clone()]);
    post.status = PostStatus::Approved;
    service.create_post(&post).await.unwrap();

    let report = service.publish_post(&post.id).await.unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].account_id, discord.id);
    assert!(report.outcomes[0].success);
    assert_eq!(report.outcomes[0].provider_post_id.as_deref(), Some("msg-1"));

    assert_eq!(report.outcomes[1].account_id, linkedin.id);
    assert!(!report.outcomes[1].success);
    assert!(matches!(
        report.outcomes[1].error,
        Some(DeliveryError::Unauthorized(_))
    ));

    // One failure keeps the post unpublished
    assert_eq!(report.status, PostStatus::Approved);
    let stored = store.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Approved);

    let history = service.publish_history(&post.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|r| r.success).count(), 1);

    assert_eq!(
        events.recv().await.unwrap(),
        Event::PublishStarted {
            post_id: post.id.clone(),
            targets: 2
        }
    );
}

#[tokio::test]
async fn test_all_targets_succeeding_publishes_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/W2/T2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let discord = connected_account(
        &store,
        "discord",
        "W2",
        format!("{}/api/webhooks/W2/T2", server.uri()),
    )
    .await;
    let service = service_with(store.clone(), registry_for(&server));

    let post = Post::new("Hello".to_string()).with_targets([discord.id.clone()]);
    service.create_post(&post).await.unwrap();

    let report = service.publish_post(&post.id).await.unwrap();
    assert_eq!(report.status, PostStatus::Published);
    assert!(report.outcomes[0].success);
    assert!(report.outcomes[0].provider_post_id.is_none());

    let stored = store.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);
}

#[tokio::test]
async fn test_post_without_targets_is_left_alone() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let service = service_with(store.clone(), registry_for(&server));

    let post = Post::new("Nobody listens".to_string());
    service.create_post(&post).await.unwrap();

    let report = service.publish_post(&post.id).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.status, PostStatus::Draft);
}

#[tokio::test]
async fn test_publishing_unknown_post_is_not_found() {
    let server = MockServer::start().await;
    let service = service_with(Arc::new(MemoryStore::new()), registry_for(&server));

    let err = service.publish_post("missing").await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_deleted_account_is_removed_from_targets() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let discord = connected_account(
        &store,
        "discord",
        "W3",
        format!("{}/api/webhooks/W3/T3", server.uri()),
    )
    .await;
    let service = service_with(store.clone(), registry_for(&server));

    let post = Post::new("Soon".to_string()).with_targets([discord.id.clone()]);
    service.create_post(&post).await.unwrap();

    service.delete_account(&discord.id).await.unwrap();

    let stored = store.get_post(&post.id).await.unwrap().unwrap();
    assert!(stored.targets.is_empty());
    assert!(service.find_account(&discord.id).await.unwrap().is_none());
}
