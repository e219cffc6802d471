/// Authentication orchestration
///
/// Sign-up, sign-in, refresh, sign-out and change-password on top of the
/// member store, the session store, the token codec and the password hasher.
/// Only `Active` members may sign in or refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::TokenCodec;
use crate::auth::member::{
    Member, MemberRole, MemberStatus, MemberStore, NewMember, EMAIL_CONSTRAINT,
};
use crate::auth::password::PasswordHasher;
use crate::auth::refresh_token::{NewRefreshToken, SessionStore};
use crate::clock::Clock;
use crate::error::{AppError, AuthError, DatabaseError};

/// Where a request came from; stored on the refresh-token row
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub username: String,
    pub password: String,
    pub member_name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub id: i64,
    pub username: String,
    pub member_name: String,
    pub role: MemberRole,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            username: member.username.clone(),
            member_name: member.member_name.clone(),
            role: member.role,
        }
    }
}

/// Result of a successful sign-in or refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub member: MemberSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfile {
    pub id: i64,
    pub username: String,
    pub member_name: String,
    pub phone_number: String,
    pub email_address: Option<String>,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Member> for MemberProfile {
    fn from(member: Member) -> Self {
        Self {
            id: member.id,
            username: member.username,
            member_name: member.member_name,
            phone_number: member.phone_number,
            email_address: member.email_address,
            role: member.role,
            status: member.status,
            last_login_at: member.last_login_at,
            password_changed_at: member.password_changed_at,
            created_at: member.created_at,
        }
    }
}

pub struct AuthService {
    members: Arc<dyn MemberStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(
        members: Arc<dyn MemberStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: TokenCodec,
        hasher: PasswordHasher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            members,
            sessions,
            tokens,
            hasher,
            clock,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Register a new `Active` member with role `User`
    ///
    /// Input is expected to be validated already. No tokens are issued.
    ///
    /// # Errors
    /// - `DuplicateLogin` / `DuplicateEmail` if the username or email is taken
    #[tracing::instrument(skip(self, request), fields(username = %request.username))]
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<i64, AppError> {
        if self.members.exists_by_username(&request.username).await? {
            return Err(AuthError::DuplicateLogin.into());
        }
        if let Some(email) = request.email_address.as_deref() {
            if self.members.exists_by_email(email).await? {
                return Err(AuthError::DuplicateEmail.into());
            }
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let new_member = NewMember {
            username: request.username,
            password_hash,
            member_name: request.member_name,
            phone_number: request.phone_number,
            email_address: request.email_address,
            role: MemberRole::User,
            created_at: self.clock.now(),
        };

        // A concurrent sign-up can still win between the check and the insert.
        let member_id = self.members.insert(new_member).await.map_err(|e| match e {
            AppError::Database(DatabaseError::UniqueConstraintViolation(constraint))
                if constraint == EMAIL_CONSTRAINT =>
            {
                AppError::Auth(AuthError::DuplicateEmail)
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                AppError::Auth(AuthError::DuplicateLogin)
            }
            other => other,
        })?;

        tracing::info!(member_id = member_id, "Member signed up");
        Ok(member_id)
    }

    /// Verify credentials and open a new session
    ///
    /// The password is checked before the account status, so an unknown
    /// username and a wrong password are indistinguishable.
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown username or wrong password
    /// - `AccountSuspended` / `AccountDeleted` for a correct password on an
    ///   inactive account; no token is issued and no session row is written
    #[tracing::instrument(skip(self, username, password, client))]
    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<AuthTokens, AppError> {
        let member = match self.members.find_by_username(username).await? {
            Some(member) => member,
            None => {
                self.hasher.verify_dummy(password);
                tracing::warn!("Sign-in failed: unknown username");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, &member.password_hash) {
            tracing::warn!(member_id = member.id, "Sign-in failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        match member.status {
            MemberStatus::Active => {}
            MemberStatus::Suspended => {
                tracing::warn!(member_id = member.id, "Sign-in refused: account suspended");
                return Err(AuthError::AccountSuspended.into());
            }
            MemberStatus::Deleted => {
                tracing::warn!(member_id = member.id, "Sign-in refused: account deleted");
                return Err(AuthError::AccountDeleted.into());
            }
        }

        let access_token = self.tokens.issue_access(&member)?;
        let refresh = self.tokens.issue_refresh(&member)?;

        self.sessions
            .create(NewRefreshToken {
                member_id: member.id,
                token: refresh.token.clone(),
                issued_at: refresh.issued_at,
                expires_at: refresh.expires_at,
                user_agent: client.user_agent.clone(),
                ip_address: client.ip_address.clone(),
            })
            .await?;

        // Bookkeeping only; the session above is already live.
        if let Err(e) = self.members.record_login(member.id, self.clock.now()).await {
            tracing::warn!(member_id = member.id, error = %e, "Failed to record last login");
        }

        tracing::info!(member_id = member.id, "Member signed in");
        Ok(self.auth_tokens(&member, access_token, refresh.token))
    }

    /// Exchange a valid refresh token for a new token pair
    ///
    /// The presented token is revoked and its replacement stored in one atomic
    /// step; of two concurrent refreshes with the same token exactly one wins.
    ///
    /// # Errors
    /// - `RefreshTokenNotFound` if the token is absent, revoked, expired or
    ///   was redeemed concurrently
    /// - `AccountSuspended` if the member is no longer active
    #[tracing::instrument(skip(self, refresh_token, client))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<AuthTokens, AppError> {
        let now = self.clock.now();

        let record = match self.sessions.find_valid(refresh_token, now).await? {
            Some(record) => record,
            None => {
                self.log_rejected_refresh(refresh_token, now).await;
                return Err(AuthError::RefreshTokenNotFound.into());
            }
        };

        let member = match self.members.find_by_id(record.member_id).await? {
            Some(member) => member,
            None => {
                tracing::warn!(
                    member_id = record.member_id,
                    "Refresh rejected: member no longer exists"
                );
                return Err(AuthError::RefreshTokenNotFound.into());
            }
        };

        if !member.is_active() {
            tracing::warn!(
                member_id = member.id,
                status = %member.status,
                "Refresh refused: account not active"
            );
            return Err(AuthError::AccountSuspended.into());
        }

        let access_token = self.tokens.issue_access(&member)?;
        let replacement = self.tokens.issue_refresh(&member)?;

        let rotated = self
            .sessions
            .rotate(
                refresh_token,
                now,
                NewRefreshToken {
                    member_id: member.id,
                    token: replacement.token.clone(),
                    issued_at: replacement.issued_at,
                    expires_at: replacement.expires_at,
                    user_agent: client.user_agent.clone(),
                    ip_address: client.ip_address.clone(),
                },
            )
            .await?;

        if rotated.is_none() {
            tracing::warn!(
                member_id = member.id,
                "Refresh rejected: token redeemed concurrently"
            );
            return Err(AuthError::RefreshTokenNotFound.into());
        }

        tracing::info!(member_id = member.id, "Refresh token rotated");
        Ok(self.auth_tokens(&member, access_token, replacement.token))
    }

    /// Revoke a refresh token; unknown or already revoked tokens are fine
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn sign_out(&self, refresh_token: &str) -> Result<(), AppError> {
        let revoked = self.sessions.revoke(refresh_token, self.clock.now()).await?;
        tracing::info!(revoked = revoked, "Member signed out");
        Ok(())
    }

    /// Replace the password of a member and end all of their sessions
    ///
    /// Sessions are revoked before the new hash is stored, so an error at any
    /// step never leaves an earlier refresh token usable under a changed password.
    ///
    /// # Errors
    /// - `MemberNotFound` for an unknown member id
    /// - `PasswordMismatch` if `current_password` is wrong
    /// - `SamePassword` if the new password equals the current one; nothing is
    ///   changed or revoked in that case
    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        member_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let member = self
            .members
            .find_by_id(member_id)
            .await?
            .ok_or(AuthError::MemberNotFound)?;

        if !self.hasher.verify(current_password, &member.password_hash) {
            tracing::warn!(member_id = member_id, "Password change refused: mismatch");
            return Err(AuthError::PasswordMismatch.into());
        }
        if self.hasher.verify(new_password, &member.password_hash) {
            return Err(AuthError::SamePassword.into());
        }

        let password_hash = self.hasher.hash(new_password)?;

        // Sessions go before the password changes: a failure in between leaves
        // the old password working and nothing signed in, never the reverse.
        let now = self.clock.now();
        let revoked = self
            .sessions
            .revoke_all_for_member(member_id, now)
            .await?;
        self.members
            .update_password(member_id, &password_hash, now)
            .await?;

        tracing::info!(
            member_id = member_id,
            revoked = revoked,
            "Password changed, sessions revoked"
        );
        Ok(())
    }

    pub async fn profile(&self, member_id: i64) -> Result<MemberProfile, AppError> {
        let member = self
            .members
            .find_by_id(member_id)
            .await?
            .ok_or(AuthError::MemberNotFound)?;

        Ok(member.into())
    }

    fn auth_tokens(&self, member: &Member, access_token: String, refresh_token: String) -> AuthTokens {
        AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_expires_in(),
            member: MemberSummary::from(member),
        }
    }

    // The caller only ever sees `RefreshTokenNotFound`; logs keep the reason.
    async fn log_rejected_refresh(&self, refresh_token: &str, now: DateTime<Utc>) {
        match self.sessions.lookup(refresh_token).await {
            Ok(None) => tracing::warn!(reason = "absent", "Refresh rejected"),
            Ok(Some(record)) if record.revoked => tracing::warn!(
                reason = "revoked",
                member_id = record.member_id,
                "Refresh rejected: revoked token presented"
            ),
            Ok(Some(record)) if record.is_expired_at(now) => tracing::warn!(
                reason = "expired",
                member_id = record.member_id,
                "Refresh rejected"
            ),
            Ok(Some(record)) => tracing::warn!(
                member_id = record.member_id,
                "Refresh rejected: token became valid after lookup"
            ),
            Err(e) => tracing::warn!(error = %e, "Refresh rejected, reason unknown"),
        }
    }
}
