/// Refresh Token Management
///
/// One row per issued refresh token. Rows are:
/// - keyed by the SHA-256 hash of the token value (plaintext is never stored)
/// - append-only except for the `revoked` flag, which flips false -> true once
/// - single-use: redeeming a token revokes it and inserts its replacement
///   in the same transaction (rotation)
/// - deleted only by the expiry sweep

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::AppError;

/// A persisted refresh token
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub member_id: i64,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Not revoked and not yet expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

/// Data for a refresh token about to be persisted
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub member_id: i64,
    /// Plaintext token value; hashed before it reaches storage
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Persistence of refresh-token rows
///
/// All mutation goes through `create`, `revoke`, `revoke_all_for_member`,
/// `rotate` and `sweep_expired`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError>;

    /// The row for `token` if it is unrevoked and `expires_at > now`
    async fn find_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// The row for `token` in any state; diagnostics only, never for access decisions
    async fn lookup(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Revoke one token at `now`; returns 1 if an unrevoked row was flipped, else 0
    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<u64, AppError>;

    async fn revoke_all_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Atomically revoke `presented` (if still valid at `now`) and insert `replacement`
    ///
    /// Returns `None` without inserting anything when `presented` was no longer
    /// valid, which is how the loser of a concurrent refresh race finds out.
    async fn rotate(
        &self,
        presented: &str,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    async fn count_valid_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError>;

    /// Delete rows with `expires_at < now`, revoked or not
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// Hash a refresh token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

const RECORD_COLUMNS: &str = "id, member_id, token_hash, issued_at, expires_at, revoked, \
     revoked_at, user_agent, ip_address";

/// Postgres-backed session store (`refresh_tokens` table)
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<'e, E>(
        executor: E,
        token: &NewRefreshToken,
    ) -> Result<RefreshTokenRecord, AppError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            INSERT INTO refresh_tokens
                (member_id, token_hash, issued_at, expires_at, revoked, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, false, $5, $6)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(token.member_id)
        .bind(hash_token(&token.token))
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(&token.user_agent)
        .bind(&token.ip_address)
        .fetch_one(executor)
        .await?;

        Ok(record)
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    #[tracing::instrument(skip(self, token), fields(member_id = token.member_id))]
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        Self::insert(&self.pool, &token).await
    }

    async fn find_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            r#"
            SELECT {}
            FROM refresh_tokens
            WHERE token_hash = $1 AND revoked = false AND expires_at > $2
            "#,
            RECORD_COLUMNS
        ))
        .bind(hash_token(token))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn lookup(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&format!(
            "SELECT {} FROM refresh_tokens WHERE token_hash = $1",
            RECORD_COLUMNS
        ))
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND revoked = false
            "#,
        )
        .bind(now)
        .bind(hash_token(token))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE member_id = $2 AND revoked = false
            "#,
        )
        .bind(now)
        .bind(member_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            member_id = member_id,
            revoked = result.rows_affected(),
            "All refresh tokens revoked for member"
        );
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self, presented, replacement), fields(member_id = replacement.member_id))]
    async fn rotate(
        &self,
        presented: &str,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock taken by the UPDATE serializes concurrent redemptions of one
        // token; the loser re-evaluates the WHERE clause and matches nothing.
        let revoked = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = $1
            WHERE token_hash = $2 AND revoked = false AND expires_at > $1
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(hash_token(presented))
        .fetch_optional(&mut *tx)
        .await?;

        if revoked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let record = Self::insert(&mut *tx, &replacement).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    async fn count_valid_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM refresh_tokens
            WHERE member_id = $1 AND revoked = false AND expires_at > $2
            "#,
        )
        .bind(member_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(revoked: bool, expires_in: Duration) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: 1,
            member_id: 1,
            token_hash: hash_token("token"),
            issued_at: now,
            expires_at: now + expires_in,
            revoked,
            revoked_at: None,
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn test_token_hashing() {
        let hash1 = hash_token("some.refresh.token");
        let hash2 = hash_token("some.refresh.token");

        // Same token should produce same hash
        assert_eq!(hash1, hash2);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, "some.refresh.token");
    }

    #[test]
    fn test_different_tokens_different_hashes() {
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn test_record_validity() {
        let now = Utc::now();

        assert!(record(false, Duration::hours(1)).is_valid_at(now));
        assert!(!record(true, Duration::hours(1)).is_valid_at(now));
        assert!(!record(false, Duration::hours(-1)).is_valid_at(now));
    }
}
