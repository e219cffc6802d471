/// In-process stores
///
/// `MemberStore` and `SessionStore` backed by a mutex-guarded map. Every
/// operation runs inside one critical section, which gives `rotate` the same
/// all-or-nothing behaviour as the Postgres transaction. Used by tests and
/// for running the service without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::auth::member::{
    Member, MemberStatus, MemberStore, NewMember, EMAIL_CONSTRAINT, USERNAME_CONSTRAINT,
};
use crate::auth::refresh_token::{hash_token, NewRefreshToken, RefreshTokenRecord, SessionStore};
use crate::error::{AppError, DatabaseError};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::store_unavailable("in-memory store lock poisoned"))
}

#[derive(Default)]
struct MemberTable {
    next_id: i64,
    rows: HashMap<i64, Member>,
}

#[derive(Default)]
pub struct InMemoryMemberStore {
    table: Mutex<MemberTable>,
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Administrative status change (suspension, deletion, reactivation)
    pub fn set_status(&self, id: i64, status: MemberStatus) -> Result<(), AppError> {
        let mut table = lock(&self.table)?;
        let member = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("member {}", id)))?;
        member.status = status;
        member.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, AppError> {
        let table = lock(&self.table)?;
        Ok(table.rows.values().find(|m| m.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Member>, AppError> {
        let table = lock(&self.table)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AppError> {
        let table = lock(&self.table)?;
        Ok(table.rows.values().any(|m| m.username == username))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .values()
            .any(|m| m.email_address.as_deref() == Some(email)))
    }

    async fn insert(&self, member: NewMember) -> Result<i64, AppError> {
        let mut table = lock(&self.table)?;

        if table.rows.values().any(|m| m.username == member.username) {
            return Err(DatabaseError::UniqueConstraintViolation(
                USERNAME_CONSTRAINT.to_string(),
            )
            .into());
        }
        if let Some(email) = member.email_address.as_deref() {
            if table
                .rows
                .values()
                .any(|m| m.email_address.as_deref() == Some(email))
            {
                return Err(DatabaseError::UniqueConstraintViolation(
                    EMAIL_CONSTRAINT.to_string(),
                )
                .into());
            }
        }

        table.next_id += 1;
        let id = table.next_id;
        table.rows.insert(
            id,
            Member {
                id,
                username: member.username,
                password_hash: member.password_hash,
                member_name: member.member_name,
                phone_number: member.phone_number,
                email_address: member.email_address,
                role: member.role,
                status: MemberStatus::Active,
                last_login_at: None,
                password_changed_at: None,
                created_at: member.created_at,
                updated_at: member.created_at,
            },
        );

        Ok(id)
    }

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut table = lock(&self.table)?;
        if let Some(member) = table.rows.get_mut(&id) {
            member.password_hash = password_hash.to_string();
            member.password_changed_at = Some(changed_at);
            member.updated_at = changed_at;
        }
        Ok(())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut table = lock(&self.table)?;
        if let Some(member) = table.rows.get_mut(&id) {
            member.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[derive(Default)]
struct TokenTable {
    next_id: i64,
    // keyed by token hash
    rows: HashMap<String, RefreshTokenRecord>,
}

impl TokenTable {
    fn insert(&mut self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        let token_hash = hash_token(&token.token);
        if self.rows.contains_key(&token_hash) {
            return Err(DatabaseError::UniqueConstraintViolation(
                "refresh_tokens_token_hash_key".to_string(),
            )
            .into());
        }

        self.next_id += 1;
        let record = RefreshTokenRecord {
            id: self.next_id,
            member_id: token.member_id,
            token_hash: token_hash.clone(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            revoked: false,
            revoked_at: None,
            user_agent: token.user_agent,
            ip_address: token.ip_address,
        };
        self.rows.insert(token_hash, record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    table: Mutex<TokenTable>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held, revoked and expired ones included
    pub fn len(&self) -> usize {
        lock(&self.table).map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, token: NewRefreshToken) -> Result<RefreshTokenRecord, AppError> {
        lock(&self.table)?.insert(token)
    }

    async fn find_valid(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .get(&hash_token(token))
            .filter(|r| r.is_valid_at(now))
            .cloned())
    }

    async fn lookup(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let table = lock(&self.table)?;
        Ok(table.rows.get(&hash_token(token)).cloned())
    }

    async fn revoke(&self, token: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut table = lock(&self.table)?;
        match table.rows.get_mut(&hash_token(token)) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                record.revoked_at = Some(now);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn revoke_all_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut table = lock(&self.table)?;
        let mut revoked = 0;
        for record in table
            .rows
            .values_mut()
            .filter(|r| r.member_id == member_id && !r.revoked)
        {
            record.revoked = true;
            record.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn rotate(
        &self,
        presented: &str,
        now: DateTime<Utc>,
        replacement: NewRefreshToken,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut table = lock(&self.table)?;
        let presented_hash = hash_token(presented);

        match table.rows.get(&presented_hash) {
            Some(record) if record.is_valid_at(now) => {}
            _ => return Ok(None),
        }

        // Insert first so a failed insert leaves the presented token untouched.
        let record = table.insert(replacement)?;
        if let Some(old) = table.rows.get_mut(&presented_hash) {
            old.revoked = true;
            old.revoked_at = Some(now);
        }

        Ok(Some(record))
    }

    async fn count_valid_for_member(
        &self,
        member_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .values()
            .filter(|r| r.member_id == member_id && r.is_valid_at(now))
            .count() as u64)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut table = lock(&self.table)?;
        let before = table.rows.len();
        table.rows.retain(|_, r| r.expires_at >= now);
        Ok((before - table.rows.len()) as u64)
    }
}
