/// Member identity
///
/// The identity collaborator of the auth service: lookup by login name or id,
/// creation at sign-up, and the two writes authentication owns
/// (password hash and last-login bookkeeping).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub const USERNAME_CONSTRAINT: &str = "members_username_key";
pub const EMAIL_CONSTRAINT: &str = "members_email_address_key";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    User,
    Admin,
    SuperAdmin,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::User => "USER",
            MemberRole::Admin => "ADMIN",
            MemberRole::SuperAdmin => "SUPER_ADMIN",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(MemberRole::User),
            "ADMIN" => Ok(MemberRole::Admin),
            "SUPER_ADMIN" => Ok(MemberRole::SuperAdmin),
            other => Err(AppError::Internal(format!("Unknown member role: {}", other))),
        }
    }
}

/// Account status
///
/// Only `Active` accounts may sign in or refresh. Nothing in this crate moves
/// an account back to `Active`; that is an administrative action.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    Active,
    Suspended,
    Deleted,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "ACTIVE",
            MemberStatus::Suspended => "SUSPENDED",
            MemberStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(MemberStatus::Active),
            "SUSPENDED" => Ok(MemberStatus::Suspended),
            "DELETED" => Ok(MemberStatus::Deleted),
            other => Err(AppError::Internal(format!("Unknown member status: {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub member_name: String,
    pub phone_number: String,
    pub email_address: Option<String>,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Data for a member about to be created
#[derive(Debug, Clone)]
pub struct NewMember {
    pub username: String,
    pub password_hash: String,
    pub member_name: String,
    pub phone_number: String,
    pub email_address: Option<String>,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, AppError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, AppError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError>;

    /// Insert a new `Active` member and return its id
    ///
    /// A duplicate username or email fails with
    /// `DatabaseError::UniqueConstraintViolation` naming the violated constraint.
    async fn insert(&self, member: NewMember) -> Result<i64, AppError>;

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: i64,
    username: String,
    password_hash: String,
    member_name: String,
    phone_number: String,
    email_address: Option<String>,
    role: String,
    status: String,
    last_login_at: Option<DateTime<Utc>>,
    password_changed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for Member {
    type Error = AppError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        Ok(Member {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            member_name: row.member_name,
            phone_number: row.phone_number,
            email_address: row.email_address,
            role: row.role.parse()?,
            status: row.status.parse()?,
            last_login_at: row.last_login_at,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const MEMBER_COLUMNS: &str = "id, username, password_hash, member_name, phone_number, \
     email_address, role, status, last_login_at, password_changed_at, created_at, updated_at";

/// Postgres-backed member store (`members` table)
#[derive(Clone)]
pub struct PgMemberStore {
    pool: PgPool,
}

impl PgMemberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PgMemberStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE username = $1",
            MEMBER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Member::try_from).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM members WHERE id = $1",
            MEMBER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Member::try_from).transpose()
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM members WHERE username = $1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM members WHERE email_address = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, member: NewMember) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO members
                (username, password_hash, member_name, phone_number, email_address,
                 role, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            "#,
        )
        .bind(&member.username)
        .bind(&member.password_hash)
        .bind(&member.member_name)
        .bind(&member.phone_number)
        .bind(&member.email_address)
        .bind(member.role.as_str())
        .bind(MemberStatus::Active.as_str())
        .bind(member.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE members
            SET password_hash = $1, password_changed_at = $2, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(password_hash)
        .bind(changed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE members SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
