//! Error types for Linkcast

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LinkcastError>;

#[derive(Error, Debug)]
pub enum LinkcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Correlation failed: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LinkcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LinkcastError::Config(_) => 2,
            LinkcastError::InvalidInput(_) => 3,
            LinkcastError::Database(_)
            | LinkcastError::Auth(_)
            | LinkcastError::Correlation(_)
            | LinkcastError::Delivery(_)
            | LinkcastError::NotFound(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Failure to turn an authorization grant into credentials.
///
/// Messages never carry the grant value itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token exchange rejected with HTTP {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("grant not supported: {0}")]
    UnsupportedGrant(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

/// Validation failure of a correlation (`state`) token.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("authorization request expired")]
    Expired,

    #[error("authorization request not found")]
    NotFound,

    #[error("authorization request replayed for a different provider")]
    Replayed,
}

impl CorrelationError {
    pub fn code(&self) -> &'static str {
        match self {
            CorrelationError::Expired => "state_expired",
            CorrelationError::NotFound => "state_not_found",
            CorrelationError::Replayed => "state_replayed",
        }
    }
}

/// Per-target publish failure.
///
/// Terminal for the one target it describes; siblings are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DeliveryError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("no adapter registered for provider '{0}'")]
    UnsupportedProvider(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("provider rejected the request with HTTP {status}: {body}")]
    ProviderRejected { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("account unavailable: {0}")]
    AccountUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Stable snake_case identifier for the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Unauthorized(_) => "unauthorized",
            DeliveryError::UnsupportedProvider(_) => "unsupported_provider",
            DeliveryError::NetworkFailure(_) => "network_failure",
            DeliveryError::ProviderRejected { .. } => "provider_rejected",
            DeliveryError::MalformedResponse(_) => "malformed_response",
            DeliveryError::AccountUnavailable(_) => "account_unavailable",
            DeliveryError::Internal(_) => "internal",
        }
    }
}

/// Terminal failure of one link attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    #[error("provider denied authorization: {error}")]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("identity is already linked to account {account_id}")]
    AlreadyLinked { account_id: String },

    #[error("account belongs to provider '{expected}', callback came from '{actual}'")]
    ProviderMismatch { expected: String, actual: String },

    #[error("social account {0} not found")]
    AccountNotFound(String),

    #[error("storage failure: {0}")]
    Store(String),
}

impl LinkError {
    /// Error indicator appended to the failure redirect
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::Correlation(e) => e.code(),
            LinkError::Auth(AuthError::TokenExchangeFailed { .. }) => "token_exchange_failed",
            LinkError::Auth(AuthError::UnsupportedGrant(_)) => "unsupported_grant",
            LinkError::Auth(_) => "authorization_failed",
            LinkError::UnknownProvider(_) => "unknown_provider",
            LinkError::InvalidCallback(_) => "invalid_callback",
            LinkError::ProviderDenied { .. } => "provider_denied",
            LinkError::AlreadyLinked { .. } => "already_linked",
            LinkError::ProviderMismatch { .. } => "provider_mismatch",
            LinkError::AccountNotFound(_) => "account_not_found",
            LinkError::Store(_) => "internal_error",
        }
    }
}

impl From<LinkcastError> for LinkError {
    fn from(error: LinkcastError) -> Self {
        match error {
            LinkcastError::Correlation(e) => LinkError::Correlation(e),
            LinkcastError::Auth(e) => LinkError::Auth(e),
            LinkcastError::NotFound(what) => LinkError::AccountNotFound(what),
            other => LinkError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_config_error() {
        let error = LinkcastError::Config(ConfigError::MissingField("linkedin.client_id".into()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_invalid_input() {
        let error = LinkcastError::InvalidInput("empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_runtime_errors() {
        let delivery = LinkcastError::Delivery(DeliveryError::NetworkFailure("timeout".into()));
        let auth = LinkcastError::Auth(AuthError::Network("refused".into()));
        let db = LinkcastError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        )));
        assert_eq!(delivery.exit_code(), 1);
        assert_eq!(auth.exit_code(), 1);
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = LinkcastError::Config(ConfigError::MissingField("discord.client_id".into()));
        assert_eq!(
            error.to_string(),
            "Configuration error: Missing required field: discord.client_id"
        );
    }

    #[test]
    fn test_delivery_error_formatting() {
        let rejected = DeliveryError::ProviderRejected {
            status: 422,
            body: "duplicate post".to_string(),
        };
        assert_eq!(
            rejected.to_string(),
            "provider rejected the request with HTTP 422: duplicate post"
        );

        let unsupported = DeliveryError::UnsupportedProvider("mastodon".into());
        assert!(unsupported.to_string().contains("mastodon"));
    }

    #[test]
    fn test_delivery_error_kinds_are_stable() {
        assert_eq!(DeliveryError::Unauthorized("x".into()).kind(), "unauthorized");
        assert_eq!(
            DeliveryError::UnsupportedProvider("x".into()).kind(),
            "unsupported_provider"
        );
        assert_eq!(DeliveryError::NetworkFailure("x".into()).kind(), "network_failure");
        assert_eq!(
            DeliveryError::ProviderRejected {
                status: 500,
                body: String::new()
            }
            .kind(),
            "provider_rejected"
        );
    }

    #[test]
    fn test_delivery_error_serializes_with_kind_tag() {
        let error = DeliveryError::ProviderRejected {
            status: 400,
            body: "bad".to_string(),
        };
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["kind"], "provider_rejected");
        assert_eq!(value["detail"]["status"], 400);

        let value = serde_json::to_value(DeliveryError::Unauthorized("expired".into())).unwrap();
        assert_eq!(value["kind"], "unauthorized");
        assert_eq!(value["detail"], "expired");
    }

    #[test]
    fn test_link_error_codes() {
        assert_eq!(LinkError::from(CorrelationError::NotFound).code(), "state_not_found");
        assert_eq!(LinkError::from(CorrelationError::Expired).code(), "state_expired");
        assert_eq!(LinkError::from(CorrelationError::Replayed).code(), "state_replayed");
        assert_eq!(
            LinkError::from(AuthError::TokenExchangeFailed {
                status: 400,
                body: "invalid_grant".into()
            })
            .code(),
            "token_exchange_failed"
        );
        assert_eq!(
            LinkError::AlreadyLinked {
                account_id: "a".into()
            }
            .code(),
            "already_linked"
        );
    }

    #[test]
    fn test_link_error_from_linkcast_error_keeps_taxonomy() {
        let error: LinkError = LinkcastError::Correlation(CorrelationError::Expired).into();
        assert_eq!(error, LinkError::Correlation(CorrelationError::Expired));

        let error: LinkError = LinkcastError::NotFound("acc-1".into()).into();
        assert_eq!(error, LinkError::AccountNotFound("acc-1".into()));

        let error: LinkError = LinkcastError::InvalidInput("bad".into()).into();
        assert!(matches!(error, LinkError::Store(_)));
    }

    #[test]
    fn test_error_conversion_from_delivery_error() {
        let error: LinkcastError = DeliveryError::Internal("boom".into()).into();
        match error {
            LinkcastError::Delivery(_) => {}
            _ => panic!("Expected LinkcastError::Delivery"),
        }
    }
}
