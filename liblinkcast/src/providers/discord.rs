//! Discord adapter
//!
//! Discord accounts are channel webhooks created through the
//! `webhook.incoming` OAuth scope. The callback already carries the webhook id
//! and token, so linking needs no outbound call. The full webhook URL is kept
//! as the account's access token and is the only thing delivery needs.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use super::{rejection, transport_failure, Ack, Grant, ProviderAdapter};
use crate::config::DiscordConfig;
use crate::error::{AuthError, DeliveryError};
use crate::types::{Credentials, LinkedIdentity};

pub const TAG: &str = "discord";

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    id: String,
}

pub struct DiscordAdapter {
    client_id: String,
    redirect_uri: String,
    authorization_endpoint: String,
    scope: String,
    webhook_base: String,
    http_client: Client,
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            scope: config.scope.clone(),
            webhook_base: config.webhook_base.trim_end_matches('/').to_string(),
            http_client: Client::new(),
        }
    }

    fn webhook_url(&self, id: &str, token: &str) -> String {
        format!("{}/{}/{}", self.webhook_base, id, token)
    }
}

fn account_name(guild_id: Option<&str>, channel_id: Option<&str>) -> String {
    format!(
        "Discord (Server: {}, Channel: {})",
        guild_id.unwrap_or("unknown"),
        channel_id.unwrap_or("unknown")
    )
}

#[async_trait]
impl ProviderAdapter for DiscordAdapter {
    fn tag(&self) -> &str {
        TAG
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("scope", self.scope.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Configuration(format!("authorization endpoint: {}", e)))?;

        Ok(url.into())
    }

    async fn exchange_grant(&self, grant: Grant) -> Result<LinkedIdentity, AuthError> {
        match grant {
            Grant::Webhook {
                id,
                token,
                channel_id,
                guild_id,
            } => {
                if id.trim().is_empty() || token.trim().is_empty() {
                    return Err(AuthError::InvalidResponse(
                        "webhook grant is missing its id or token".to_string(),
                    ));
                }

                tracing::debug!(provider = TAG, webhook_id = %id, "Discord webhook linked");

                Ok(LinkedIdentity {
                    display_name: account_name(guild_id.as_deref(), channel_id.as_deref()),
                    credentials: Credentials::new(self.webhook_url(&id, &token)),
                    provider_account_id: id,
                })
            }
            other => Err(AuthError::UnsupportedGrant(format!(
                "discord expects a webhook grant, got {}",
                other.kind()
            ))),
        }
    }

    async fn deliver(&self, credentials: &Credentials, content: &str) -> Result<Ack, DeliveryError> {
        let webhook = credentials.access_token();
        if webhook.is_empty() {
            return Err(DeliveryError::Unauthorized(
                "no webhook URL stored for account".to_string(),
            ));
        }
        let webhook = Url::parse(webhook).map_err(|_| {
            DeliveryError::Unauthorized("stored webhook URL is not a valid URL".to_string())
        })?;

        let response = self
            .http_client
            .post(webhook)
            .query(&[("wait", "true")])
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DeliveryError::Unauthorized(
                "webhook no longer exists".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, body));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Ack::default());
        }

        let body = response.text().await.map_err(transport_failure)?;
        let provider_post_id = serde_json::from_str::<WebhookMessage>(&body)
            .ok()
            .map(|message| message.id);

        Ok(Ack { provider_post_id })
    }
}
