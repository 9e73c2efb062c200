//! In-memory store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{apply_status, AccountLinkStore, PostStore};
use crate::error::{LinkcastError, Result};
use crate::types::{AccountStatus, Post, PostStatus, PublishOutcome, PublishRecord, SocialAccount};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, SocialAccount>,
    posts: HashMap<String, Post>,
    records: Vec<PublishRecord>,
}

/// Process-local store; contents are lost on drop
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.inner.read().await.accounts.len()
    }
}

fn identity_taken(inner: &Inner, account: &SocialAccount) -> Option<String> {
    let provider_account_id = account.provider_account_id.as_deref()?;
    inner
        .accounts
        .values()
        .find(|other| {
            other.id != account.id
                && other.provider == account.provider
                && other.provider_account_id.as_deref() == Some(provider_account_id)
        })
        .map(|other| other.id.clone())
}

#[async_trait]
impl AccountLinkStore for MemoryStore {
    async fn find_account(&self, id: &str) -> Result<Option<SocialAccount>> {
        Ok(self.inner.read().await.accounts.get(id).cloned())
    }

    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<SocialAccount>> {
        let inner = self.inner.read().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| {
                a.provider == provider
                    && a.provider_account_id.as_deref() == Some(provider_account_id)
            })
            .cloned())
    }

    async fn create_account(&self, account: &SocialAccount) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.accounts.contains_key(&account.id) {
            return Err(LinkcastError::InvalidInput(format!(
                "account {} already exists",
                account.id
            )));
        }
        if let Some(owner) = identity_taken(&inner, account) {
            return Err(LinkcastError::InvalidInput(format!(
                "identity already linked to account {}",
                owner
            )));
        }
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn upsert_account(&self, account: &SocialAccount) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(owner) = identity_taken(&inner, account) {
            return Err(LinkcastError::InvalidInput(format!(
                "identity already linked to account {}",
                owner
            )));
        }
        inner.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn mark_status(&self, id: &str, status: AccountStatus) -> Result<SocialAccount> {
        let mut inner = self.inner.write().await;
        let account = inner
            .accounts
            .get_mut(id)
            .ok_or_else(|| LinkcastError::NotFound(format!("social account {}", id)))?;
        apply_status(account, status)?;
        Ok(account.clone())
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        for post in inner.posts.values_mut() {
            post.remove_target(id);
        }
        inner
            .accounts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LinkcastError::NotFound(format!("social account {}", id)))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, post: &Post) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.posts.contains_key(&post.id) {
            return Err(LinkcastError::InvalidInput(format!(
                "post {} already exists",
                post.id
            )));
        }
        inner.posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        Ok(self.inner.read().await.posts.get(id).cloned())
    }

    async fn update_post_status(&self, id: &str, status: PostStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let post = inner
            .posts
            .get_mut(id)
            .ok_or_else(|| LinkcastError::NotFound(format!("post {}", id)))?;
        post.status = status;
        Ok(())
    }

    async fn record_outcomes(&self, post_id: &str, outcomes: &[PublishOutcome]) -> Result<()> {
        let attempted_at = Utc::now().timestamp();
        let mut inner = self.inner.write().await;
        let next_id = inner.records.len() as i64 + 1;
        for (offset, outcome) in outcomes.iter().enumerate() {
            let mut record = PublishRecord::from_outcome(post_id, outcome, attempted_at);
            record.id = Some(next_id + offset as i64);
            inner.records.push(record);
        }
        Ok(())
    }

    async fn get_publish_records(&self, post_id: &str) -> Result<Vec<PublishRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::types::{Credentials, LinkedIdentity};

    fn connected(provider: &str, remote_id: &str) -> SocialAccount {
        let mut account = SocialAccount::new(provider, "pending");
        account.connect(LinkedIdentity {
            provider_account_id: remote_id.to_string(),
            display_name: format!("{} {}", provider, remote_id),
            credentials: Credentials::new("secret-token").with_refresh_token("refresh"),
        });
        account
    }

    #[tokio::test]
    async fn test_find_by_provider_identity() {
        let store = MemoryStore::new();
        let account = connected("discord", "W1");
        store.create_account(&account).await.unwrap();

        let found = store
            .find_by_provider_identity("discord", "W1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);

        assert!(store
            .find_by_provider_identity("linkedin", "W1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_identity_unique_per_provider() {
        let store = MemoryStore::new();
        store.create_account(&connected("discord", "W1")).await.unwrap();

        let duplicate = connected("discord", "W1");
        assert!(store.upsert_account(&duplicate).await.is_err());

        // Same remote id on another provider is a different identity
        store.upsert_account(&connected("linkedin", "W1")).await.unwrap();
        assert_eq!(store.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_mark_disconnected_clears_secrets() {
        let store = MemoryStore::new();
        let account = connected("linkedin", "sub-1");
        store.create_account(&account).await.unwrap();

        let updated = store
            .mark_status(&account.id, AccountStatus::Disconnected)
            .await
            .unwrap();
        assert_eq!(updated.status, AccountStatus::Disconnected);
        assert!(updated.credentials.is_none());
        assert!(updated.provider_account_id.is_none());

        let stored = store.find_account(&account.id).await.unwrap().unwrap();
        assert!(stored.credentials.is_none());
    }

    #[tokio::test]
    async fn test_mark_connected_without_credentials_fails() {
        let store = MemoryStore::new();
        let account = SocialAccount::new("discord", "Team channel");
        store.create_account(&account).await.unwrap();

        let result = store.mark_status(&account.id, AccountStatus::Connected).await;
        assert!(matches!(result, Err(LinkcastError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_mark_status_missing_account() {
        let store = MemoryStore::new();
        let result = store.mark_status("nope", AccountStatus::Disconnected).await;
        assert!(matches!(result, Err(LinkcastError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_account_unlinks_posts() {
        let store = MemoryStore::new();
        let keep = connected("discord", "W1");
        let gone = connected("linkedin", "sub-1");
        store.create_account(&keep).await.unwrap();
        store.create_account(&gone).await.unwrap();

        let post = Post::new("Hello".to_string()).with_targets([keep.id.clone(), gone.id.clone()]);
        store.create_post(&post).await.unwrap();

        store.delete_account(&gone.id).await.unwrap();

        let post = store.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(post.targets, vec![keep.id]);
        assert!(store.find_account(&gone.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_account(&gone.id).await,
            Err(LinkcastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_record_outcomes_history() {
        let store = MemoryStore::new();
        let post = Post::new("Hello".to_string());
        store.create_post(&post).await.unwrap();

        let outcomes = vec![
            PublishOutcome::delivered("a1", "discord", Some("m1".to_string())),
            PublishOutcome::failed("a2", "linkedin", DeliveryError::Unauthorized("401".into())),
        ];
        store.record_outcomes(&post.id, &outcomes).await.unwrap();

        let records = store.get_publish_records(&post.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, Some(1));
        assert!(records[0].success);
        assert_eq!(records[0].provider_post_id.as_deref(), Some("m1"));
        assert!(!records[1].success);
        assert!(records[1].error_message.as_deref().unwrap().contains("401"));

        assert!(store.get_publish_records("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_post_status() {
        let store = MemoryStore::new();
        let post = Post::new("Hello".to_string());
        store.create_post(&post).await.unwrap();

        store
            .update_post_status(&post.id, PostStatus::Published)
            .await
            .unwrap();
        let post = store.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);

        assert!(store
            .update_post_status("missing", PostStatus::Published)
            .await
            .is_err());
    }
}
