//! Core types for Linkcast

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DeliveryError, LinkcastError};

/// Connection state of a social account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Disconnected,
    Connected,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Disconnected => "DISCONNECTED",
            AccountStatus::Connected => "CONNECTED",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = LinkcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DISCONNECTED" => Ok(AccountStatus::Disconnected),
            "CONNECTED" => Ok(AccountStatus::Connected),
            _ => Err(LinkcastError::InvalidInput(format!(
                "Invalid account status: '{}'",
                s
            ))),
        }
    }
}

/// Durable credentials for one linked account.
///
/// Always replaced as a whole on link; never patched field by field. For
/// webhook-style providers `access_token` is the full delivery URL.
#[derive(Debug)]
pub struct Credentials {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::from(refresh_token.into()));
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the credentials are past their expiry at `now`.
    ///
    /// Credentials without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            access_token: SecretString::from(self.access_token().to_owned()),
            refresh_token: self
                .refresh_token()
                .map(|t| SecretString::from(t.to_owned())),
            expires_at: self.expires_at,
        }
    }
}

/// Identity and credentials obtained from a successful grant exchange
#[derive(Debug, Clone)]
pub struct LinkedIdentity {
    /// Identity on the remote platform (LinkedIn `sub`, Discord webhook id)
    pub provider_account_id: String,
    /// Display label for the account
    pub display_name: String,
    pub credentials: Credentials,
}

/// A social account a workspace can publish to
#[derive(Debug, Clone, Serialize)]
pub struct SocialAccount {
    pub id: String,
    pub provider: String,
    pub provider_account_id: Option<String>,
    pub status: AccountStatus,
    pub name: String,
    pub workspace_id: Option<String>,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SocialAccount {
    /// Create a new, disconnected account
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            provider_account_id: None,
            status: AccountStatus::Disconnected,
            name: name.into(),
            workspace_id: None,
            credentials: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to CONNECTED with a freshly exchanged identity.
    ///
    /// The previous credential set is dropped in one step.
    pub fn connect(&mut self, identity: LinkedIdentity) {
        self.provider_account_id = Some(identity.provider_account_id);
        self.name = identity.display_name;
        self.credentials = Some(identity.credentials);
        self.status = AccountStatus::Connected;
        self.updated_at = Utc::now().timestamp();
    }

    /// Transition to DISCONNECTED, purging every secret and the remote identity
    pub fn disconnect(&mut self) {
        self.provider_account_id = None;
        self.credentials = None;
        self.status = AccountStatus::Disconnected;
        self.updated_at = Utc::now().timestamp();
    }

    pub fn is_connected(&self) -> bool {
        self.status == AccountStatus::Connected && self.credentials.is_some()
    }
}

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Draft,
    Approved,
    Scheduled,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "DRAFT",
            PostStatus::Approved => "APPROVED",
            PostStatus::Scheduled => "SCHEDULED",
            PostStatus::Published => "PUBLISHED",
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = LinkcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(PostStatus::Draft),
            "APPROVED" => Ok(PostStatus::Approved),
            "SCHEDULED" => Ok(PostStatus::Scheduled),
            "PUBLISHED" => Ok(PostStatus::Published),
            _ => Err(LinkcastError::InvalidInput(format!(
                "Invalid post status: '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub content: String,
    pub status: PostStatus,
    pub workspace_id: Option<String>,
    pub created_at: i64,
    pub scheduled_at: Option<i64>,
    /// Target account ids, without duplicates
    pub targets: Vec<String>,
}

impl Post {
    pub fn new(content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            status: PostStatus::Draft,
            workspace_id: None,
            created_at: Utc::now().timestamp(),
            scheduled_at: None,
            targets: Vec::new(),
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for target in targets {
            self.add_target(target);
        }
        self
    }

    /// Add a target account; returns false if it was already targeted
    pub fn add_target(&mut self, account_id: impl Into<String>) -> bool {
        let account_id = account_id.into();
        if self.targets.contains(&account_id) {
            return false;
        }
        self.targets.push(account_id);
        true
    }

    /// Remove a target account; returns false if it was not targeted
    pub fn remove_target(&mut self, account_id: &str) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t != account_id);
        self.targets.len() != before
    }
}

/// Result of one delivery attempt to one target
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub account_id: String,
    pub provider: String,
    pub success: bool,
    pub error: Option<DeliveryError>,
    /// Id the provider assigned to the published content, when it reports one
    pub provider_post_id: Option<String>,
}

impl PublishOutcome {
    pub fn delivered(
        account_id: impl Into<String>,
        provider: impl Into<String>,
        provider_post_id: Option<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            provider: provider.into(),
            success: true,
            error: None,
            provider_post_id,
        }
    }

    pub fn failed(
        account_id: impl Into<String>,
        provider: impl Into<String>,
        error: DeliveryError,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            provider: provider.into(),
            success: false,
            error: Some(error),
            provider_post_id: None,
        }
    }
}

/// Persisted history row for one publish outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub id: Option<i64>,
    pub post_id: String,
    pub account_id: String,
    pub provider: String,
    pub success: bool,
    pub provider_post_id: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

impl PublishRecord {
    pub fn from_outcome(post_id: &str, outcome: &PublishOutcome, attempted_at: i64) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            account_id: outcome.account_id.clone(),
            provider: outcome.provider.clone(),
            success: outcome.success,
            provider_post_id: outcome.provider_post_id.clone(),
            error_message: outcome.error.as_ref().map(|e| e.to_string()),
            attempted_at,
        }
    }
}
