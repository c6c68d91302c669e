//! Revocation list for bearer tokens.
//!
//! Entries are keyed by the SHA-256 of the token and carry their own expiry.
//! Once an entry expires the token it names has expired as well, so the
//! entry can be dropped.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::db::format_timestamp;

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Remember `token_hash` as revoked until `expires_at`
    async fn revoke(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Whether `token_hash` is on the list and its entry has not expired
    async fn is_revoked(&self, token_hash: &str) -> Result<bool>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// Revocation list persisted next to the rest of the data
pub struct SqliteRevocationStore {
    db: SqlitePool,
}

impl SqliteRevocationStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RevocationStore for SqliteRevocationStore {
    async fn revoke(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        // Revoking twice keeps the later expiry
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_hash, expires_at) VALUES (?, ?)
            ON CONFLICT(token_hash) DO UPDATE SET expires_at = MAX(expires_at, excluded.expires_at)
            "#,
        )
        .bind(token_hash)
        .bind(format_timestamp(expires_at))
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str) -> Result<bool> {
        let found: Option<(String,)> = sqlx::query_as(
            "SELECT token_hash FROM revoked_tokens WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(format_timestamp(Utc::now()))
        .fetch_optional(&self.db)
        .await?;
        Ok(found.is_some())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?")
            .bind(format_timestamp(Utc::now()))
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Process-local revocation list, for single-instance deployments and tests
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.entries
            .entry(token_hash.to_string())
            .and_modify(|current| *current = (*current).max(expires_at))
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, token_hash: &str) -> Result<bool> {
        Ok(self
            .entries
            .get(token_hash)
            .map(|expires_at| *expires_at > Utc::now())
            .unwrap_or(false))
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut removed = 0u64;
        self.entries.retain(|_, expires_at| {
            let live = *expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::Duration;

    async fn exercise(store: &dyn RevocationStore) {
        let live = hash_token("live-token");
        let stale = hash_token("stale-token");

        assert!(!store.is_revoked(&live).await.unwrap());

        store.revoke(&live, Utc::now() + Duration::hours(1)).await.unwrap();
        store.revoke(&stale, Utc::now() - Duration::seconds(1)).await.unwrap();

        assert!(store.is_revoked(&live).await.unwrap());
        assert!(!store.is_revoked(&stale).await.unwrap());

        // A shorter second revoke does not shorten the entry
        store.revoke(&live, Utc::now() - Duration::hours(1)).await.unwrap();
        assert!(store.is_revoked(&live).await.unwrap());

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.is_revoked(&live).await.unwrap());
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryRevocationStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_purge_counts_only_removed_entries() {
        let store = std::sync::Arc::new(MemoryRevocationStore::new());
        for i in 0..100 {
            let hash = hash_token(&format!("stale-{i}"));
            store.revoke(&hash, Utc::now() - Duration::seconds(1)).await.unwrap();
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    let hash = hash_token(&format!("live-{i}"));
                    store.revoke(&hash, Utc::now() + Duration::hours(1)).await.unwrap();
                }
            })
        };
        let purged = store.purge_expired().await.unwrap();
        writer.await.unwrap();

        assert_eq!(purged, 100);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        let (pool, _dir) = test_pool().await;
        exercise(&SqliteRevocationStore::new(pool)).await;
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("abc"));
        assert_ne!(hash, hash_token("abd"));
    }
}
