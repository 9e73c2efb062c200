//! LinkedIn adapter
//!
//! Linking uses the OAuth 2.0 authorization-code flow with OpenID Connect. The
//! member identity is read from the `id_token` returned by the token endpoint,
//! so a link costs a single outbound call. Publishing resolves the member URN
//! through the userinfo endpoint and creates a UGC post.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;

use super::{rejection, transport_failure, truncate, Ack, Grant, ProviderAdapter};
use crate::config::LinkedInConfig;
use crate::error::{AuthError, DeliveryError};
use crate::types::{Credentials, LinkedIdentity};

pub const TAG: &str = "linkedin";

/// API version requested from the userinfo endpoint
const API_VERSION: &str = "202511";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

/// Claims read from the unverified `id_token` payload.
///
/// The token arrives over the TLS channel the exchange was made on, so only
/// the identity claims are extracted.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

impl IdTokenClaims {
    fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            "LinkedIn".to_string()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
}

#[derive(Debug, Deserialize)]
struct UgcPostResponse {
    id: Option<String>,
}

pub struct LinkedInAdapter {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    posts_endpoint: String,
    scope: String,
    http_client: Client,
}

impl LinkedInAdapter {
    pub fn new(config: &LinkedInConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorization_endpoint: config.authorization_endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
            userinfo_endpoint: config.userinfo_endpoint.clone(),
            posts_endpoint: config.posts_endpoint.clone(),
            scope: config.scope.clone(),
            http_client: Client::new(),
        }
    }

    async fn member_urn(&self, access_token: &str) -> Result<String, DeliveryError> {
        let response = self
            .http_client
            .get(&self.userinfo_endpoint)
            .bearer_auth(access_token)
            .header("LinkedIn-Version", API_VERSION)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, body));
        }

        let info: UserInfo = response.json().await.map_err(transport_failure)?;
        Ok(format!("urn:li:person:{}", info.sub))
    }
}

/// Decode the claims segment of a compact JWT
fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, AuthError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidResponse("id_token is not a compact JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidResponse(format!("id_token payload: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidResponse(format!("id_token claims: {}", e)))
}

/// UGC share envelope for a text-only public post
/// Absolute expiry for a token that lives `expires_in` seconds from `now`
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, AuthError> {
    if expires_in < 0 {
        return Err(AuthError::InvalidResponse(format!(
            "negative expires_in: {}",
            expires_in
        )));
    }
    chrono::Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidResponse(format!("expires_in out of range: {}", expires_in))
        })
}

fn ugc_post_body(author: &str, content: &str) -> serde_json::Value {
    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": content },
                "shareMediaCategory": "NONE"
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

#[async_trait]
impl ProviderAdapter for LinkedInAdapter {
    fn tag(&self) -> &str {
        TAG
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("scope", self.scope.as_str()),
            ],
        )
        .map_err(|e| AuthError::Configuration(format!("authorization endpoint: {}", e)))?;

        Ok(url.into())
    }

    async fn exchange_grant(&self, grant: Grant) -> Result<LinkedIdentity, AuthError> {
        let code = match grant {
            Grant::AuthorizationCode { code } => code,
            other => {
                return Err(AuthError::UnsupportedGrant(format!(
                    "linkedin expects an authorization code, got {}",
                    other.kind()
                )))
            }
        };

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "LinkedIn token exchange rejected");
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("token response: {}", e)))?;

        let id_token = token.id_token.as_deref().ok_or_else(|| {
            AuthError::InvalidResponse("token response carries no id_token".to_string())
        })?;
        let claims = decode_id_token(id_token)?;

        let expires_at = token
            .expires_in
            .map(|secs| expiry_after(Utc::now(), secs))
            .transpose()?;

        let mut credentials = Credentials::new(token.access_token).with_expiry(expires_at);
        if let Some(refresh) = token.refresh_token {
            credentials = credentials.with_refresh_token(refresh);
        }

        tracing::debug!(provider = TAG, "LinkedIn grant exchanged");

        Ok(LinkedIdentity {
            display_name: claims.display_name(),
            provider_account_id: claims.sub,
            credentials,
        })
    }

    async fn deliver(&self, credentials: &Credentials, content: &str) -> Result<Ack, DeliveryError> {
        let author = self.member_urn(credentials.access_token()).await?;

        let response = self
            .http_client
            .post(&self.posts_endpoint)
            .bearer_auth(credentials.access_token())
            .header("x-restli-protocol-version", "2.0.0")
            .json(&ugc_post_body(&author, content))
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, body));
        }

        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if header_id.is_some() {
            return Ok(Ack {
                provider_post_id: header_id,
            });
        }

        let body = response.text().await.map_err(transport_failure)?;
        let provider_post_id = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<UgcPostResponse>(&body)
                .map_err(|e| DeliveryError::MalformedResponse(e.to_string()))?
                .id
        };

        Ok(Ack { provider_post_id })
    }
}
