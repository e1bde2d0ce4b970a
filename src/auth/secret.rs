//! Single-use secret tokens for password reset and email verification.
//!
//! The cleartext leaves the server exactly once, inside an email. Only a SHA-256
//! digest and an absolute expiry are stored on the user record.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::models::SecretDigest;

const TOKEN_BYTES: usize = 32;

/// 256 random bits from the OS, URL-safe base64 without padding.
pub fn random_token() -> Result<String, AppError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        AppError::InternalServerError(format!("Failed to generate secret token: {}", e))
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretPurpose {
    PasswordReset,
    EmailVerification,
}

/// A freshly generated token: the cleartext for delivery and the digest to persist.
#[derive(Debug, Clone)]
pub struct IssuedSecret {
    pub cleartext: String,
    pub digest: SecretDigest,
}

#[derive(Debug, Clone, Copy)]
pub struct SecretTokens {
    reset_ttl: Duration,
    verification_ttl: Duration,
}

impl Default for SecretTokens {
    fn default() -> Self {
        Self::new(10, 60 * 24)
    }
}

impl SecretTokens {
    pub fn new(reset_ttl_minutes: i64, verification_ttl_minutes: i64) -> Self {
        Self {
            reset_ttl: Duration::minutes(reset_ttl_minutes),
            verification_ttl: Duration::minutes(verification_ttl_minutes),
        }
    }

    pub fn ttl(&self, purpose: SecretPurpose) -> Duration {
        match purpose {
            SecretPurpose::PasswordReset => self.reset_ttl,
            SecretPurpose::EmailVerification => self.verification_ttl,
        }
    }

    pub fn issue(
        &self,
        purpose: SecretPurpose,
        now: DateTime<Utc>,
    ) -> Result<IssuedSecret, AppError> {
        let cleartext = random_token()?;

        Ok(IssuedSecret {
            digest: SecretDigest {
                hash: Self::hash(&cleartext),
                expires_at: now + self.ttl(purpose),
            },
            cleartext,
        })
    }

    /// Lowercase hex SHA-256 of the cleartext. Used both to persist and to look up.
    pub fn hash(cleartext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cleartext.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// True when `cleartext` hashes to the stored digest and `now` has not passed
    /// the stored expiry.
    pub fn validate(cleartext: &str, stored: &SecretDigest, now: DateTime<Utc>) -> bool {
        if now > stored.expires_at {
            return false;
        }
        let candidate = Self::hash(cleartext);
        candidate.as_bytes().ct_eq(stored.hash.as_bytes()).into()
    }
}
