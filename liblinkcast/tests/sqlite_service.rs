//! End-to-end tests against the SQLite store
//!
//! Builds the service from configuration the way the server does and checks
//! that linked accounts, posts and publish history survive a restart.

use liblinkcast::config::{DatabaseConfig, DiscordConfig};
use liblinkcast::{AccountStatus, Config, LinkIntent, LinkcastService, Post, PostStatus, ProviderResponse};
use reqwest::Url;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(temp_dir: &TempDir, server: &MockServer) -> Config {
    let mut config = Config::default_config();
    config.database = DatabaseConfig {
        path: temp_dir
            .path()
            .join("linkcast.db")
            .to_str()
            .unwrap()
            .to_string(),
    };
    config.links.state_secret = Some("0123456789abcdef0123456789abcdef".to_string());
    config.discord = Some(DiscordConfig {
        enabled: true,
        client_id: "dc-client".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        authorization_endpoint: "https://discord.com/oauth2/authorize".to_string(),
        scope: "webhook.incoming".to_string(),
        webhook_base: format!("{}/api/webhooks", server.uri()),
    });
    config
}

async fn link_discord(service: &LinkcastService, webhook_id: &str) -> String {
    let url = service.begin_link(LinkIntent::new("discord")).await.unwrap();
    let state = Url::parse(&url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    service
        .complete_link(ProviderResponse {
            state: Some(state),
            webhook_id: Some(webhook_id.to_string()),
            webhook_token: Some("secret-token".to_string()),
            channel_id: Some("C1".to_string()),
            guild_id: Some("G1".to_string()),
            ..Default::default()
        })
        .await
        .outcome
        .unwrap()
        .account_id
}

#[tokio::test]
async fn test_linked_account_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let config = config_for(&temp_dir, &server);

    let account_id = {
        let service = LinkcastService::from_config(&config).await.unwrap();
        link_discord(&service, "W1").await
    };

    let service = LinkcastService::from_config(&config).await.unwrap();
    let account = service.find_account(&account_id).await.unwrap().unwrap();

    assert_eq!(account.status, AccountStatus::Connected);
    assert_eq!(account.provider_account_id.as_deref(), Some("W1"));
    assert_eq!(
        account.credentials.unwrap().access_token(),
        format!("{}/api/webhooks/W1/secret-token", server.uri())
    );
}

#[tokio::test]
async fn test_publish_persists_status_and_history() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/W5/secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-5"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&temp_dir, &server);
    let service = LinkcastService::from_config(&config).await.unwrap();
    let account_id = link_discord(&service, "W5").await;

    let mut post = Post::new("Release notes".to_string()).with_targets([account_id.clone()]);
    post.status = PostStatus::Scheduled;
    service.create_post(&post).await.unwrap();

    let report = service.publish_post(&post.id).await.unwrap();
    assert_eq!(report.status, PostStatus::Published);

    let stored = service.get_post(&post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert_eq!(stored.targets, vec![account_id.clone()]);

    let history = service.publish_history(&post.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].provider_post_id.as_deref(), Some("msg-5"));
    assert_eq!(history[0].account_id, account_id);
}

#[tokio::test]
async fn test_disconnect_purges_stored_secrets() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let config = config_for(&temp_dir, &server);

    let service = LinkcastService::from_config(&config).await.unwrap();
    let account_id = link_discord(&service, "W9").await;

    service.disconnect_account(&account_id).await.unwrap();

    let reopened = LinkcastService::from_config(&config).await.unwrap();
    let account = reopened.find_account(&account_id).await.unwrap().unwrap();
    assert_eq!(account.status, AccountStatus::Disconnected);
    assert!(account.credentials.is_none());
    assert!(account.provider_account_id.is_none());
}
