//! Account linking
//!
//! [`CallbackHandler::begin_link`] turns a [`LinkIntent`] into a provider
//! authorization URL. [`CallbackHandler::complete_link`] takes whatever the
//! provider sent back to the callback endpoint, validates the correlation
//! token, exchanges the grant and stores the linked account. Completion never
//! fails outright: every path ends in a [`LinkResult`] with somewhere to send
//! the browser.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::{info, warn};

use crate::correlation::{AuthorizationCorrelator, LinkIntent};
use crate::error::{AuthError, LinkError};
use crate::events::{Event, EventBus};
use crate::providers::{Grant, ProviderRegistry};
use crate::store::AccountLinkStore;
use crate::types::SocialAccount;

/// Query parameters a provider may send back to the callback endpoint
#[derive(Default, Clone, Deserialize)]
pub struct ProviderResponse {
    /// Provider the callback route was registered for, when known
    pub provider: Option<String>,
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub webhook_id: Option<String>,
    pub webhook_token: Option<String>,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
}

impl std::fmt::Debug for ProviderResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderResponse")
            .field("provider", &self.provider)
            .field("has_state", &self.state.is_some())
            .field("has_code", &self.code.is_some())
            .field("error", &self.error)
            .field("webhook_id", &self.webhook_id)
            .finish_non_exhaustive()
    }
}

impl ProviderResponse {
    fn grant(&self) -> Option<Grant> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if let (Some(id), Some(token)) = (non_empty(&self.webhook_id), non_empty(&self.webhook_token))
        {
            return Some(Grant::Webhook {
                id,
                token,
                channel_id: non_empty(&self.channel_id),
                guild_id: non_empty(&self.guild_id),
            });
        }

        non_empty(&self.code).map(|code| Grant::AuthorizationCode { code })
    }
}

/// The account a successful link touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub account_id: String,
    pub provider: String,
    /// False when an existing account was re-linked
    pub created: bool,
}

/// Terminal result of one callback
#[derive(Debug, Clone)]
pub struct LinkResult {
    /// Where the browser should be sent next
    pub redirect_to: String,
    pub outcome: Result<LinkedAccount, LinkError>,
}

impl LinkResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Where browsers land after a link attempt
#[derive(Debug, Clone)]
pub struct RedirectTargets {
    pub success: String,
    pub error: String,
}

/// Upper bound on one grant exchange
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Accept a post-link destination only if it is a same-site absolute path
fn sanitize_redirect_after(redirect: &str) -> Option<&str> {
    let trimmed = redirect.trim();
    // URL parsing strips tabs and newlines, which would turn "/\t/host" into "//host"
    if trimmed.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return None;
    }
    if !trimmed.starts_with('/') {
        return None;
    }
    // protocol-relative and backslash tricks
    if trimmed.starts_with("//") || trimmed.starts_with("/\\") || trimmed.contains("://") {
        return None;
    }
    Some(trimmed)
}

impl RedirectTargets {
    fn success_url(&self, redirect_after: Option<&str>) -> String {
        let Some(path) = redirect_after.and_then(sanitize_redirect_after) else {
            return self.success.clone();
        };
        let Ok(base) = Url::parse(&self.success) else {
            return self.success.clone();
        };
        match base.join(path) {
            Ok(joined) if joined.origin() == base.origin() => joined.into(),
            _ => self.success.clone(),
        }
    }

    fn error_url(&self, code: &str) -> String {
        match Url::parse(&self.error) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("error", code);
                url.into()
            }
            Err(_) => format!("{}?error={}", self.error, code),
        }
    }
}

pub struct CallbackHandler {
    correlator: Arc<AuthorizationCorrelator>,
    registry: Arc<ProviderRegistry>,
    accounts: Arc<dyn AccountLinkStore>,
    redirects: RedirectTargets,
    exchange_timeout: Duration,
    events: Option<EventBus>,
}

impl CallbackHandler {
    pub fn new(
        correlator: Arc<AuthorizationCorrelator>,
        registry: Arc<ProviderRegistry>,
        accounts: Arc<dyn AccountLinkStore>,
        redirects: RedirectTargets,
    ) -> Self {
        Self {
            correlator,
            registry,
            accounts,
            redirects,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            events: None,
        }
    }

    /// Bound each grant exchange; an exchange that takes longer fails the link
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a link and return the provider authorization URL
    pub async fn begin_link(&self, intent: LinkIntent) -> Result<String, LinkError> {
        let adapter = self
            .registry
            .get(&intent.provider)
            .ok_or_else(|| LinkError::UnknownProvider(intent.provider.clone()))?;

        if let Some(account_id) = &intent.account_id {
            let account = self
                .accounts
                .find_account(account_id)
                .await?
                .ok_or_else(|| LinkError::AccountNotFound(account_id.clone()))?;
            if account.provider != intent.provider {
                return Err(LinkError::ProviderMismatch {
                    expected: account.provider,
                    actual: intent.provider,
                });
            }
        }

        info!(
            provider = %intent.provider,
            account_id = ?intent.account_id,
            "Starting account link"
        );

        let state = self.correlator.begin(intent);
        Ok(adapter.authorization_url(&state)?)
    }

    /// Finish a link from the provider's callback parameters
    pub async fn complete_link(&self, response: ProviderResponse) -> LinkResult {
        let hinted_provider = response.provider.clone();

        match self.link(response).await {
            Ok((linked, redirect_after)) => {
                info!(
                    account_id = %linked.account_id,
                    provider = %linked.provider,
                    created = linked.created,
                    "Account linked"
                );
                self.emit(Event::LinkCompleted {
                    account_id: linked.account_id.clone(),
                    provider: linked.provider.clone(),
                    created: linked.created,
                });
                LinkResult {
                    redirect_to: self.redirects.success_url(redirect_after.as_deref()),
                    outcome: Ok(linked),
                }
            }
            Err((error, provider)) => self.fail(error, provider.or(hinted_provider)),
        }
    }

    /// Answer a callback whose parameters could not be read at all
    pub fn reject_callback(&self, reason: impl Into<String>) -> LinkResult {
        self.fail(LinkError::InvalidCallback(reason.into()), None)
    }

    fn fail(&self, error: LinkError, provider: Option<String>) -> LinkResult {
        warn!(provider = ?provider, code = error.code(), "Account link failed: {}", error);
        self.emit(Event::LinkFailed {
            provider,
            code: error.code().to_string(),
        });
        LinkResult {
            redirect_to: self.redirects.error_url(error.code()),
            outcome: Err(error),
        }
    }

    async fn link(
        &self,
        response: ProviderResponse,
    ) -> Result<(LinkedAccount, Option<String>), (LinkError, Option<String>)> {
        if let Some(error) = response.error.clone() {
            // Burn the slot so the token cannot be presented again
            if let Some(state) = response.state.as_deref() {
                let _ = self.correlator.resolve(state);
            }
            return Err((
                LinkError::ProviderDenied {
                    error,
                    description: response.error_description.clone(),
                },
                None,
            ));
        }

        let state = response.state.as_deref().filter(|s| !s.is_empty()).ok_or((
            LinkError::InvalidCallback("missing state parameter".to_string()),
            None,
        ))?;

        let resolved = match response.provider.as_deref() {
            Some(provider) => self.correlator.resolve_for(state, provider),
            None => self.correlator.resolve(state),
        };
        let intent = resolved.map_err(|e| (LinkError::from(e), None))?;
        let provider = Some(intent.provider.clone());

        self.link_intent(&intent, &response)
            .await
            .map(|linked| (linked, intent.redirect_after.clone()))
            .map_err(|e| (e, provider))
    }

    async fn link_intent(
        &self,
        intent: &LinkIntent,
        response: &ProviderResponse,
    ) -> Result<LinkedAccount, LinkError> {
        let adapter = self
            .registry
            .get(&intent.provider)
            .ok_or_else(|| LinkError::UnknownProvider(intent.provider.clone()))?;

        let grant = response.grant().ok_or_else(|| {
            LinkError::InvalidCallback("callback carries no authorization grant".to_string())
        })?;

        let identity = tokio::time::timeout(self.exchange_timeout, adapter.exchange_grant(grant))
            .await
            .map_err(|_| {
                AuthError::Network(format!(
                    "grant exchange timed out after {}s",
                    self.exchange_timeout.as_secs_f64()
                ))
            })??;

        let existing = self
            .accounts
            .find_by_provider_identity(&intent.provider, &identity.provider_account_id)
            .await?;

        let (mut account, created) = match &intent.account_id {
            Some(account_id) => {
                let account = self
                    .accounts
                    .find_account(account_id)
                    .await?
                    .ok_or_else(|| LinkError::AccountNotFound(account_id.clone()))?;
                if account.provider != intent.provider {
                    return Err(LinkError::ProviderMismatch {
                        expected: account.provider,
                        actual: intent.provider.clone(),
                    });
                }
                if let Some(owner) = existing.filter(|other| other.id != account.id) {
                    return Err(LinkError::AlreadyLinked {
                        account_id: owner.id,
                    });
                }
                (account, false)
            }
            None => match existing {
                Some(account) => (account, false),
                None => (
                    SocialAccount::new(intent.provider.clone(), identity.display_name.clone()),
                    true,
                ),
            },
        };

        if account.workspace_id.is_none() {
            account.workspace_id = intent.workspace_id.clone();
        }
        account.connect(identity);
        self.accounts.upsert_account(&account).await?;

        Ok(LinkedAccount {
            account_id: account.id,
            provider: account.provider,
            created,
        })
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}
