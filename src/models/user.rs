use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Where an account's identity comes from.
/// Corresponds to the `auth_provider` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "auth_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Email and password registered with this service.
    Local,
    /// Google OAuth.
    Google,
    /// GitHub OAuth.
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
        }
    }

    /// Human readable name, used in messages shown to the user.
    pub fn display_name(&self) -> &'static str {
        match self {
            AuthProvider::Local => "email and password",
            AuthProvider::Google => "Google",
            AuthProvider::Github => "GitHub",
        }
    }
}

/// Hash and absolute expiry of a single-use secret token.
///
/// The two values only ever exist together, which keeps the stored
/// hash/expiry columns set and cleared as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretDigest {
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

/// A user account as stored by the credential store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub reset_password: Option<SecretDigest>,
    pub email_verification: Option<SecretDigest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub avatar: Option<String>,
}

/// Partial update of a user record.
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub password_hash: Option<Option<String>>,
    pub provider: Option<AuthProvider>,
    pub provider_id: Option<Option<String>>,
    pub is_email_verified: Option<bool>,
    pub avatar: Option<Option<String>>,
    pub refresh_token: Option<Option<String>>,
    pub reset_password: Option<Option<SecretDigest>>,
    pub email_verification: Option<Option<SecretDigest>>,
}

impl UserUpdate {
    pub fn refresh_token(token: Option<String>) -> Self {
        Self {
            refresh_token: Some(token),
            ..Default::default()
        }
    }

    pub fn reset_password(digest: Option<SecretDigest>) -> Self {
        Self {
            reset_password: Some(digest),
            ..Default::default()
        }
    }

    pub fn email_verification(digest: Option<SecretDigest>) -> Self {
        Self {
            email_verification: Some(digest),
            ..Default::default()
        }
    }
}

impl User {
    /// Builds the record for a freshly created account.
    pub fn new(input: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            password_hash: input.password_hash,
            provider: input.provider,
            provider_id: input.provider_id,
            is_email_verified: input.is_email_verified,
            avatar: input.avatar,
            refresh_token: None,
            reset_password: None,
            email_verification: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a partial update in place. Every store goes through this so the
    /// semantics of `UserUpdate` do not depend on the backend.
    pub fn apply(&mut self, update: UserUpdate, now: DateTime<Utc>) {
        if let Some(password_hash) = update.password_hash {
            self.password_hash = password_hash;
        }
        if let Some(provider) = update.provider {
            self.provider = provider;
        }
        if let Some(provider_id) = update.provider_id {
            self.provider_id = provider_id;
        }
        if let Some(verified) = update.is_email_verified {
            self.is_email_verified = verified;
        }
        if let Some(avatar) = update.avatar {
            self.avatar = avatar;
        }
        if let Some(refresh_token) = update.refresh_token {
            self.refresh_token = refresh_token;
        }
        if let Some(reset_password) = update.reset_password {
            self.reset_password = reset_password;
        }
        if let Some(email_verification) = update.email_verification {
            self.email_verification = email_verification;
        }
        self.updated_at = now;
    }

    /// True when the account has no password and can only sign in through OAuth.
    pub fn is_oauth_only(&self) -> bool {
        self.password_hash.is_none()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::from(self)
    }
}

/// Flat row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub is_email_verified: bool,
    pub avatar: Option<String>,
    pub refresh_token: Option<String>,
    pub reset_password_token_hash: Option<String>,
    pub reset_password_expires_at: Option<DateTime<Utc>>,
    pub email_verification_token_hash: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn digest_from_columns(
    hash: Option<String>,
    expires_at: Option<DateTime<Utc>>,
) -> Option<SecretDigest> {
    // A half-populated pair is treated as no token at all.
    match (hash, expires_at) {
        (Some(hash), Some(expires_at)) => Some(SecretDigest { hash, expires_at }),
        _ => None,
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            provider: row.provider,
            provider_id: row.provider_id,
            is_email_verified: row.is_email_verified,
            avatar: row.avatar,
            refresh_token: row.refresh_token,
            reset_password: digest_from_columns(
                row.reset_password_token_hash,
                row.reset_password_expires_at,
            ),
            email_verification: digest_from_columns(
                row.email_verification_token_hash,
                row.email_verification_expires_at,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Public view of a user returned by the API. Never carries secrets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub provider: AuthProvider,
    pub avatar: Option<String>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            provider: user.provider,
            avatar: user.avatar.clone(),
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
        }
    }
}
