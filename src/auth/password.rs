/// Password Hashing and Verification
///
/// Slow, salted one-way hashing with bcrypt. Strength rules for new passwords
/// live in `validators`; this module only hashes and compares.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Fixed input for the dummy hash used by `verify_dummy`
const DUMMY_PASSWORD: &str = "dummy-password-for-timing-equalization";

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher with the given bcrypt cost (4..=31)
    ///
    /// # Errors
    /// Returns error if the cost is out of range for bcrypt
    pub fn new(cost: u32) -> Result<Self, AppError> {
        let dummy_hash = hash(DUMMY_PASSWORD, cost)
            .map_err(|e| AppError::Internal(format!("Invalid bcrypt cost {}: {}", cost, e)))?;

        Ok(Self { cost, dummy_hash })
    }

    /// Hash a password
    ///
    /// # Errors
    /// Returns error if bcrypt hashing fails
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored hash
    ///
    /// Never fails: a malformed stored hash is logged and counts as a mismatch.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        match verify(password, password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash could not be verified");
                false
            }
        }
    }

    /// Spend one verification on a fixed hash
    ///
    /// Sign-in calls this for unknown usernames so they cost the same as a
    /// wrong password.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").field("cost", &self.cost).finish()
    }
}
