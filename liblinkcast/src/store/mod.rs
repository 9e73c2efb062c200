//! Storage contracts
//!
//! The linking and publishing flows only need a handful of operations on
//! accounts and posts. Two implementations are provided: [`MemoryStore`] for
//! tests and embedding, and the SQLite-backed [`crate::db::Database`].

use async_trait::async_trait;

use crate::error::{LinkcastError, Result};
use crate::types::{AccountStatus, Post, PostStatus, PublishOutcome, PublishRecord, SocialAccount};

pub mod memory;

pub use memory::MemoryStore;

/// Durable record of provider identity, application account and credentials
#[async_trait]
pub trait AccountLinkStore: Send + Sync {
    async fn find_account(&self, id: &str) -> Result<Option<SocialAccount>>;

    /// Look up the account linked to a remote identity
    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<SocialAccount>>;

    /// Insert a new account; fails if the id is taken
    async fn create_account(&self, account: &SocialAccount) -> Result<()>;

    /// Insert or fully replace an account, credentials included
    async fn upsert_account(&self, account: &SocialAccount) -> Result<()>;

    /// Move an account to `status`.
    ///
    /// Marking DISCONNECTED clears every secret and the remote identity.
    /// Marking CONNECTED requires stored credentials. Returns the updated
    /// account, or `NotFound` if it does not exist.
    async fn mark_status(&self, id: &str, status: AccountStatus) -> Result<SocialAccount>;

    /// Remove an account after unlinking it from every post that targets it
    async fn delete_account(&self, id: &str) -> Result<()>;
}

/// Posts and their publish history
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: &Post) -> Result<()>;

    async fn get_post(&self, id: &str) -> Result<Option<Post>>;

    async fn update_post_status(&self, id: &str, status: PostStatus) -> Result<()>;

    /// Append one history row per outcome
    async fn record_outcomes(&self, post_id: &str, outcomes: &[PublishOutcome]) -> Result<()>;

    /// History rows for a post, oldest first
    async fn get_publish_records(&self, post_id: &str) -> Result<Vec<PublishRecord>>;
}

/// Apply a status change to an in-memory account
pub(crate) fn apply_status(account: &mut SocialAccount, status: AccountStatus) -> Result<()> {
    match status {
        AccountStatus::Disconnected => account.disconnect(),
        AccountStatus::Connected => {
            if account.credentials.is_none() {
                return Err(LinkcastError::InvalidInput(format!(
                    "account {} has no credentials to connect with",
                    account.id
                )));
            }
            account.status = AccountStatus::Connected;
            account.updated_at = chrono::Utc::now().timestamp();
        }
    }
    Ok(())
}
