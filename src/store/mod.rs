//! Persistence of user accounts.
//!
//! Everything the authentication flows need from storage goes through the
//! [`UserStore`] trait. `PgUserStore` is the production backend; `MemoryUserStore`
//! keeps records in process and backs development runs without a database and
//! the test-suite.

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::SecretPurpose;
use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, SecretDigest, User, UserUpdate};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Exact match; callers normalise the address first.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_provider_identity(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Looks up the account holding a password-reset digest, expired or not.
    async fn find_by_reset_token_hash(&self, hash: &str) -> Result<Option<User>, AppError>;

    /// Looks up the account holding an email-verification digest, expired or not.
    async fn find_by_verification_token_hash(&self, hash: &str)
        -> Result<Option<User>, AppError>;

    /// Removes the `purpose` digest whose hash is `hash` and returns the account,
    /// with the digest already cleared, together with the removed digest.
    ///
    /// The removal is atomic: of several concurrent calls with the same hash at
    /// most one gets `Some`. Expiry is not checked here.
    async fn take_secret(
        &self,
        purpose: SecretPurpose,
        hash: &str,
    ) -> Result<Option<(User, SecretDigest)>, AppError>;

    /// Fails with `AppError::DuplicateEmail` when the address is taken.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Applies `update` atomically and returns the stored result.
    /// Fails with `AppError::NotFound` for an unknown id.
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, AppError>;
}
