use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::UserStore;
use crate::auth::SecretPurpose;
use crate::error::AppError;
use crate::models::user::UserRow;
use crate::models::{AuthProvider, NewUser, SecretDigest, User, UserUpdate};

const USER_COLUMNS: &str = "id, name, email, password_hash, provider, provider_id, \
     is_email_verified, avatar, refresh_token, \
     reset_password_token_hash, reset_password_expires_at, \
     email_verification_token_hash, email_verification_expires_at, \
     created_at, updated_at";

/// A user row as returned after a digest was taken, plus the digest columns as
/// they were before the update.
#[derive(FromRow)]
struct TakenSecretRow {
    #[sqlx(flatten)]
    user: UserRow,
    taken_hash: String,
    taken_expires_at: Option<DateTime<Utc>>,
}

fn secret_columns(purpose: SecretPurpose) -> (&'static str, &'static str) {
    match purpose {
        SecretPurpose::PasswordReset => ("reset_password_token_hash", "reset_password_expires_at"),
        SecretPurpose::EmailVerification => (
            "email_verification_token_hash",
            "email_verification_expires_at",
        ),
    }
}

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, condition);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map_or(false, |code| code == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("email", email).await
    }

    async fn find_by_provider_identity(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE provider = $1 AND provider_id = $2",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(provider)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_reset_token_hash(&self, hash: &str) -> Result<Option<User>, AppError> {
        self.fetch_one_where("reset_password_token_hash", hash).await
    }

    async fn find_by_verification_token_hash(
        &self,
        hash: &str,
    ) -> Result<Option<User>, AppError> {
        self.fetch_one_where("email_verification_token_hash", hash)
            .await
    }

    async fn take_secret(
        &self,
        purpose: SecretPurpose,
        hash: &str,
    ) -> Result<Option<(User, SecretDigest)>, AppError> {
        let (hash_column, expires_column) = secret_columns(purpose);
        // The locking sub-select is re-checked after a concurrent take commits,
        // so the second caller no longer sees the hash and updates nothing.
        let sql = format!(
            "UPDATE users SET {hash} = NULL, {expires} = NULL, updated_at = $2 \
             FROM (SELECT id AS taken_id, {hash} AS taken_hash, {expires} AS taken_expires_at \
                   FROM users WHERE {hash} = $1 FOR UPDATE) AS taken \
             WHERE users.id = taken.taken_id \
             RETURNING {columns}, taken.taken_hash, taken.taken_expires_at",
            hash = hash_column,
            expires = expires_column,
            columns = USER_COLUMNS
        );
        let row = sqlx::query_as::<_, TakenSecretRow>(&sql)
            .bind(hash)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| {
            let expires_at = row.taken_expires_at?;
            Some((
                User::from(row.user),
                SecretDigest {
                    hash: row.taken_hash,
                    expires_at,
                },
            ))
        }))
    }

    async fn create(&self, input: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, password_hash, provider, provider_id, \
             is_email_verified, avatar) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(input.provider)
            .bind(&input.provider_id)
            .bind(input.is_email_verified)
            .bind(&input.avatar)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DuplicateEmail
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(User::from(row))
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        let mut user = User::from(row);
        user.apply(update, Utc::now());

        let (reset_hash, reset_expires) = match &user.reset_password {
            Some(digest) => (Some(digest.hash.clone()), Some(digest.expires_at)),
            None => (None, None),
        };
        let (verify_hash, verify_expires) = match &user.email_verification {
            Some(digest) => (Some(digest.hash.clone()), Some(digest.expires_at)),
            None => (None, None),
        };

        let sql = format!(
            "UPDATE users SET password_hash = $2, provider = $3, provider_id = $4, \
             is_email_verified = $5, avatar = $6, refresh_token = $7, \
             reset_password_token_hash = $8, reset_password_expires_at = $9, \
             email_verification_token_hash = $10, email_verification_expires_at = $11, \
             updated_at = $12 \
             WHERE id = $1 \
             RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&user.password_hash)
            .bind(user.provider)
            .bind(&user.provider_id)
            .bind(user.is_email_verified)
            .bind(&user.avatar)
            .bind(&user.refresh_token)
            .bind(reset_hash)
            .bind(reset_expires)
            .bind(verify_hash)
            .bind(verify_expires)
            .bind(user.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(User::from(row))
    }
}
