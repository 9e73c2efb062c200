//! Correlation of authorization callbacks with the link request that started them
//!
//! `begin` issues an opaque token that travels to the provider as the OAuth
//! `state` parameter (or the webhook equivalent) and comes back on the
//! callback. The token is signed, so garbled or forged values are rejected
//! before the slot table is consulted, and it carries its own issue time, so
//! an expired token is reported as expired no matter how often it is retried.
//!
//! Each issued token owns one pending slot. Resolving removes the slot under
//! the lock, which makes consumption exactly-once even when two callbacks race.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ConfigError, CorrelationError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Nonce length in bytes (256 bits of OS randomness)
const NONCE_LEN: usize = 32;

/// Nonce followed by the big-endian issue time in milliseconds
const PAYLOAD_LEN: usize = NONCE_LEN + 8;

/// Minimum accepted length of a configured signing secret
pub const MIN_SECRET_LEN: usize = 16;

/// What the user asked for when starting a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkIntent {
    /// Provider tag the authorization was started for
    pub provider: String,
    /// Existing account to re-link, if any
    pub account_id: Option<String>,
    pub workspace_id: Option<String>,
    /// Where to send the browser once the link completes
    pub redirect_after: Option<String>,
}

impl LinkIntent {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            account_id: None,
            workspace_id: None,
            redirect_after: None,
        }
    }

    pub fn for_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn redirect_after(mut self, url: impl Into<String>) -> Self {
        self.redirect_after = Some(url.into());
        self
    }
}

struct PendingLink {
    intent: LinkIntent,
    issued_at_ms: i64,
}

pub struct AuthorizationCorrelator {
    secret: Zeroizing<Vec<u8>>,
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingLink>>,
}

impl std::fmt::Debug for AuthorizationCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCorrelator")
            .field("ttl", &self.ttl)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl AuthorizationCorrelator {
    /// Create a correlator with a random per-process signing key.
    ///
    /// Tokens issued before a restart stop verifying afterwards.
    pub fn new(ttl: Duration) -> Self {
        let mut secret = Zeroizing::new(vec![0u8; 32]);
        OsRng.fill_bytes(secret.as_mut_slice());
        Self {
            secret,
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Create a correlator with a configured signing key
    pub fn with_secret(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "state secret must be at least {} bytes",
                MIN_SECRET_LEN
            ))
            .into());
        }

        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
            ttl,
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `intent`
    pub fn begin(&self, intent: LinkIntent) -> String {
        self.begin_at(intent, Utc::now())
    }

    pub fn begin_at(&self, intent: LinkIntent, now: DateTime<Utc>) -> String {
        let issued_at_ms = now.timestamp_millis();

        let mut payload = [0u8; PAYLOAD_LEN];
        OsRng.fill_bytes(&mut payload[..NONCE_LEN]);
        payload[NONCE_LEN..].copy_from_slice(&issued_at_ms.to_be_bytes());

        let key = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&payload));

        let ttl_ms = self.ttl_ms();
        let mut pending = self.lock();
        pending.retain(|_, slot| issued_at_ms.saturating_sub(slot.issued_at_ms) < ttl_ms);
        pending.insert(
            key.clone(),
            PendingLink {
                intent,
                issued_at_ms,
            },
        );

        format!("{}.{}", key, signature)
    }

    /// Consume a token and return the intent it was issued for
    pub fn resolve(&self, token: &str) -> std::result::Result<LinkIntent, CorrelationError> {
        self.resolve_at(token, Utc::now())
    }

    pub fn resolve_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<LinkIntent, CorrelationError> {
        let (key, payload) = self.verify(token)?;

        let mut issued = [0u8; 8];
        issued.copy_from_slice(&payload[NONCE_LEN..]);
        let issued_at_ms = i64::from_be_bytes(issued);

        if now.timestamp_millis().saturating_sub(issued_at_ms) >= self.ttl_ms() {
            self.lock().remove(key);
            return Err(CorrelationError::Expired);
        }

        self.lock()
            .remove(key)
            .map(|slot| slot.intent)
            .ok_or(CorrelationError::NotFound)
    }

    /// Consume a token arriving on a callback for `provider`.
    ///
    /// A token issued for a different provider is consumed and reported as
    /// replayed.
    pub fn resolve_for(
        &self,
        token: &str,
        provider: &str,
    ) -> std::result::Result<LinkIntent, CorrelationError> {
        let intent = self.resolve(token)?;
        if intent.provider != provider {
            tracing::warn!(
                issued_for = %intent.provider,
                received_for = %provider,
                "Authorization state presented for the wrong provider"
            );
            return Err(CorrelationError::Replayed);
        }
        Ok(intent)
    }

    /// Number of slots waiting for a callback
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn verify<'a>(
        &self,
        token: &'a str,
    ) -> std::result::Result<(&'a str, [u8; PAYLOAD_LEN]), CorrelationError> {
        let (key, signature) = token.split_once('.').ok_or(CorrelationError::NotFound)?;

        let decoded = URL_SAFE_NO_PAD
            .decode(key)
            .map_err(|_| CorrelationError::NotFound)?;
        let payload: [u8; PAYLOAD_LEN] = decoded
            .try_into()
            .map_err(|_| CorrelationError::NotFound)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CorrelationError::NotFound)?;

        self.mac(&payload)
            .verify_slice(&signature)
            .map_err(|_| CorrelationError::NotFound)?;

        Ok((key, payload))
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        self.mac(payload).finalize().into_bytes().to_vec()
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(payload);
        mac
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingLink>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
