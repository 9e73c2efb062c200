//! SQLite storage for Linkcast

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, LinkcastError, Result};
use crate::store::{apply_status, AccountLinkStore, PostStore};
use crate::types::{
    AccountStatus, Credentials, Post, PostStatus, PublishOutcome, PublishRecord, SocialAccount,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // mode=rwc creates the file on first open
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        tracing::debug!(path = %expanded_path, "Database ready");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn post_targets(&self, post_id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id FROM post_targets
            WHERE post_id = ?
            ORDER BY position
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("account_id")).collect())
    }
}

fn account_from_row(row: &SqliteRow) -> Result<SocialAccount> {
    let status: String = row.get("status");
    let status = status
        .parse::<AccountStatus>()
        .map_err(|e| DbError::Corrupt(e.to_string()))?;

    let access_token: Option<String> = row.get("access_token");
    let refresh_token: Option<String> = row.get("refresh_token");
    let expires_at: Option<i64> = row.get("expires_at");

    let credentials = access_token.map(|token| {
        let mut credentials = Credentials::new(token)
            .with_expiry(expires_at.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)));
        if let Some(refresh) = refresh_token {
            credentials = credentials.with_refresh_token(refresh);
        }
        credentials
    });

    Ok(SocialAccount {
        id: row.get("id"),
        provider: row.get("provider"),
        provider_account_id: row.get("provider_account_id"),
        status,
        name: row.get("name"),
        workspace_id: row.get("workspace_id"),
        credentials,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const ACCOUNT_COLUMNS: &str = "id, provider, provider_account_id, status, name, workspace_id, \
     access_token, refresh_token, expires_at, created_at, updated_at";

#[async_trait]
impl AccountLinkStore for Database {
    async fn find_account(&self, id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM social_accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM social_accounts WHERE provider = ? AND provider_account_id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn create_account(&self, account: &SocialAccount) -> Result<()> {
        let credentials = account.credentials.as_ref();

        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                id, provider, provider_account_id, status, name, workspace_id,
                access_token, refresh_token, expires_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .bind(account.status.as_str())
        .bind(&account.name)
        .bind(&account.workspace_id)
        .bind(credentials.map(|c| c.access_token().to_string()))
        .bind(credentials.and_then(|c| c.refresh_token().map(str::to_string)))
        .bind(credentials.and_then(|c| c.expires_at()).map(|t| t.timestamp()))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn upsert_account(&self, account: &SocialAccount) -> Result<()> {
        let credentials = account.credentials.as_ref();

        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                id, provider, provider_account_id, status, name, workspace_id,
                access_token, refresh_token, expires_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                provider = excluded.provider,
                provider_account_id = excluded.provider_account_id,
                status = excluded.status,
                name = excluded.name,
                workspace_id = excluded.workspace_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.id)
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .bind(account.status.as_str())
        .bind(&account.name)
        .bind(&account.workspace_id)
        .bind(credentials.map(|c| c.access_token().to_string()))
        .bind(credentials.and_then(|c| c.refresh_token().map(str::to_string)))
        .bind(credentials.and_then(|c| c.expires_at()).map(|t| t.timestamp()))
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn mark_status(&self, id: &str, status: AccountStatus) -> Result<SocialAccount> {
        let mut account = self
            .find_account(id)
            .await?
            .ok_or_else(|| LinkcastError::NotFound(format!("social account {}", id)))?;

        apply_status(&mut account, status)?;
        self.upsert_account(&account).await?;

        Ok(account)
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query("DELETE FROM post_targets WHERE account_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        let result = sqlx::query("DELETE FROM social_accounts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(LinkcastError::NotFound(format!("social account {}", id)));
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }
}

#[async_trait]
impl PostStore for Database {
    async fn create_post(&self, post: &Post) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, content, status, workspace_id, created_at, scheduled_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.content)
        .bind(post.status.as_str())
        .bind(&post.workspace_id)
        .bind(post.created_at)
        .bind(post.scheduled_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for (position, account_id) in post.targets.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO post_targets (post_id, account_id, position)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(account_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, content, status, workspace_id, created_at, scheduled_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get("status");
        let status = status
            .parse::<PostStatus>()
            .map_err(|e| DbError::Corrupt(e.to_string()))?;

        Ok(Some(Post {
            id: row.get("id"),
            content: row.get("content"),
            status,
            workspace_id: row.get("workspace_id"),
            created_at: row.get("created_at"),
            scheduled_at: row.get("scheduled_at"),
            targets: self.post_targets(id).await?,
        }))
    }

    async fn update_post_status(&self, id: &str, status: PostStatus) -> Result<()> {
        let result = sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(LinkcastError::NotFound(format!("post {}", id)));
        }
        Ok(())
    }

    async fn record_outcomes(&self, post_id: &str, outcomes: &[PublishOutcome]) -> Result<()> {
        let attempted_at = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        for outcome in outcomes {
            let record = PublishRecord::from_outcome(post_id, outcome, attempted_at);
            sqlx::query(
                r#"
                INSERT INTO publish_records (
                    post_id, account_id, provider, success, provider_post_id,
                    error_message, attempted_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.post_id)
            .bind(&record.account_id)
            .bind(&record.provider)
            .bind(record.success)
            .bind(&record.provider_post_id)
            .bind(&record.error_message)
            .bind(record.attempted_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn get_publish_records(&self, post_id: &str) -> Result<Vec<PublishRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, account_id, provider, success, provider_post_id,
                   error_message, attempted_at
            FROM publish_records
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PublishRecord {
                id: Some(r.get("id")),
                post_id: r.get("post_id"),
                account_id: r.get("account_id"),
                provider: r.get("provider"),
                success: r.get("success"),
                provider_post_id: r.get("provider_post_id"),
                error_message: r.get("error_message"),
                attempted_at: r.get("attempted_at"),
            })
            .collect())
    }
}
