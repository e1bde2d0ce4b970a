use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::UserStore;
use crate::auth::SecretPurpose;
use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, SecretDigest, User, UserUpdate};

/// In-process store. Every write holds the lock for the whole record, so
/// concurrent updates to one user never interleave.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find_where<F>(&self, predicate: F) -> Option<User>
    where
        F: Fn(&User) -> bool,
    {
        self.users
            .read()
            .await
            .values()
            .find(|user| predicate(user))
            .cloned()
    }
}

fn digest_matches(digest: &Option<SecretDigest>, hash: &str) -> bool {
    digest.as_ref().map_or(false, |d| d.hash == hash)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_where(|user| user.email == email).await)
    }

    async fn find_by_provider_identity(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .find_where(|user| {
                user.provider == provider && user.provider_id.as_deref() == Some(provider_id)
            })
            .await)
    }

    async fn find_by_reset_token_hash(&self, hash: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .find_where(|user| digest_matches(&user.reset_password, hash))
            .await)
    }

    async fn find_by_verification_token_hash(
        &self,
        hash: &str,
    ) -> Result<Option<User>, AppError> {
        Ok(self
            .find_where(|user| digest_matches(&user.email_verification, hash))
            .await)
    }

    async fn take_secret(
        &self,
        purpose: SecretPurpose,
        hash: &str,
    ) -> Result<Option<(User, SecretDigest)>, AppError> {
        let mut users = self.users.write().await;
        let holder = users.values_mut().find(|user| match purpose {
            SecretPurpose::PasswordReset => digest_matches(&user.reset_password, hash),
            SecretPurpose::EmailVerification => digest_matches(&user.email_verification, hash),
        });
        let Some(user) = holder else {
            return Ok(None);
        };

        let taken = match purpose {
            SecretPurpose::PasswordReset => user.reset_password.take(),
            SecretPurpose::EmailVerification => user.email_verification.take(),
        };
        user.updated_at = Utc::now();
        Ok(taken.map(|digest| (user.clone(), digest)))
    }

    async fn create(&self, input: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|user| user.email == input.email) {
            return Err(AppError::DuplicateEmail);
        }
        let user = User::new(input, Utc::now());
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        user.apply(update, Utc::now());
        Ok(user.clone())
    }
}
