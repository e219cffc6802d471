/// JWT Token Generation and Validation
///
/// Creates and parses the signed, self-contained access and refresh tokens.
/// Both kinds are HS256 JWTs signed with the process-wide secret; the
/// `token_type` claim keeps them apart.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::auth::claims::{Claims, TokenType};
use crate::auth::member::Member;
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, TokenError};

const TOKEN_ID_LENGTH: usize = 32;

/// A freshly minted refresh token together with the instants the store needs
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Build a codec from the JWT settings
    ///
    /// # Errors
    /// Returns a config error if the secret is too short or a TTL is not positive
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        config.validate()?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl: Duration::seconds(config.access_token_expiry_seconds()),
            refresh_ttl: Duration::seconds(config.refresh_token_expiry_seconds()),
            clock,
        })
    }

    /// Lifetime of an access token in seconds (`expiresIn` of auth responses)
    pub fn access_token_expires_in(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Generate a new access token for a member
    ///
    /// # Errors
    /// Returns error if token generation fails
    pub fn issue_access(&self, member: &Member) -> Result<String, AppError> {
        let now = self.clock.now();
        let claims = Claims {
            sub: member.id.to_string(),
            username: member.username.clone(),
            role: Some(member.role),
            member_name: Some(member.member_name.clone()),
            token_type: TokenType::Access,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: self.issuer.clone(),
            jti: generate_token_id(),
        };

        self.sign(&claims)
    }

    /// Generate a new refresh token for a member
    ///
    /// # Errors
    /// Returns error if token generation fails
    pub fn issue_refresh(&self, member: &Member) -> Result<IssuedRefreshToken, AppError> {
        let now = self.clock.now();
        let expires_at = now + self.refresh_ttl;
        let claims = Claims {
            sub: member.id.to_string(),
            username: member.username.clone(),
            role: None,
            member_name: None,
            token_type: TokenType::Refresh,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            jti: generate_token_id(),
        };

        Ok(IssuedRefreshToken {
            token: self.sign(&claims)?,
            issued_at: truncate_to_seconds(now),
            expires_at: truncate_to_seconds(expires_at),
        })
    }

    /// Verify signature, issuer and expiry and return the claims
    ///
    /// Expiry is checked against the codec's clock with no leeway.
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let err = classify(e.kind());
                tracing::debug!(error = %e, kind = %err, "JWT validation error");
                err
            })?;

        if claims.is_expired_at(self.clock.now().timestamp()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// `parse`, restricted to access tokens
    pub fn parse_access(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.parse(token)?;
        if !claims.is_access() {
            tracing::warn!("Refresh token presented as access token");
            return Err(TokenError::UnsupportedFormat);
        }
        Ok(claims)
    }

    /// True when the token is past `exp` or cannot be parsed at all
    pub fn is_expired(&self, token: &str) -> bool {
        self.parse(token).is_err()
    }

    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_) => TokenError::UnsupportedFormat,
        _ => TokenError::Malformed,
    }
}

fn generate_token_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LENGTH)
        .map(char::from)
        .collect()
}

// JWT timestamps have second precision; keep the stored row in step with `exp`.
fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(instant.timestamp(), 0)
        .single()
        .unwrap_or(instant)
}
