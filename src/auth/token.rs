use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::error::AppError;

/// Distinguishes access tokens from refresh tokens inside the claims.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Represents the claims encoded within a JWT.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject of the token, the user's id.
    pub sub: Uuid,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Unique token id, so two tokens issued in the same second still differ.
    pub jti: Uuid,
    pub kind: TokenKind,
}

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl From<TokenError> for AppError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Expired => AppError::TokenExpired,
            TokenError::Invalid => AppError::Unauthorized("Invalid token".into()),
        }
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKeys {
    fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

/// Issues and verifies session tokens.
///
/// Access and refresh tokens are HS256 JWTs signed with separate secrets, so a
/// refresh token can never pass as an access token and vice versa.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: SigningKeys::new(&config.access_secret, config.access_ttl_minutes),
            refresh: SigningKeys::new(&config.refresh_secret, config.refresh_ttl_minutes),
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of refresh tokens; also used as the refresh cookie max-age.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AppError> {
        let keys = self.keys(kind);
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + keys.ttl).timestamp(),
            jti: Uuid::new_v4(),
            kind,
        };

        let token = encode(&Header::default(), &claims, &keys.encoding)
            .map_err(|e| {
                AppError::InternalServerError(format!("Failed to sign token: {}", e))
            })?;
        debug!("issued {:?} token for user {}", kind, user_id);
        Ok(token)
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Access)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, AppError> {
        self.issue(user_id, TokenKind::Refresh)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access)
    }

    /// Checks signature and expiry only. Whether the token is still the one stored
    /// on the user record is decided by the caller.
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh)
    }
}
