/// JWT Claims structure
///
/// Payload shared by access and refresh tokens. Standard RFC 7519 claims plus
/// a `token_type` discriminator so a refresh token is never accepted where an
/// access token is expected.

use serde::{Deserialize, Serialize};

use crate::auth::member::MemberRole;
use crate::error::TokenError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (member id as decimal string)
    pub sub: String,
    /// Login name
    pub username: String,
    /// Role, present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    /// Display name, present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    /// Random token id; keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Member id carried in `sub`
    pub fn member_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(TokenError::Malformed)
    }

    pub fn is_access(&self) -> bool {
        self.token_type == TokenType::Access
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == TokenType::Refresh
    }

    /// Whether `exp` is at or before `now` (Unix seconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}
