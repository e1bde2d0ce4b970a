//! Mapping an OAuth provider's profile onto a local account.
//!
//! The handshake itself (authorize redirect, code exchange, profile fetch) lives in
//! [`providers`]. What comes out of it is a [`FederatedProfile`], which
//! [`resolve_identity`] turns into exactly one stored user.

pub mod providers;

pub use providers::{GitHubOAuth, GoogleOAuth, OAuthClient, OAuthProviders};

use log::info;

use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, User, UserUpdate};
use crate::store::UserStore;

/// Identity asserted by an OAuth provider after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub provider: AuthProvider,
    /// Stable id of the account at the provider.
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Provider login handle (GitHub), used when no email or display name is given.
    pub username: Option<String>,
    pub avatar: Option<String>,
}

impl FederatedProfile {
    /// The email to key the account on. Providers that withhold the address get a
    /// deterministic placeholder so repeated logins resolve to the same record.
    pub fn effective_email(&self) -> String {
        match self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            Some(email) => email.to_lowercase(),
            None => {
                let handle = self.username.as_deref().unwrap_or(&self.provider_id);
                format!("{}@{}.user", handle, self.provider.as_str())
                    .to_lowercase()
            }
        }
    }

    fn effective_name(&self, email: &str) -> String {
        self.display_name
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
    }
}

/// Finds or creates the user for `profile`.
///
/// Lookup order:
/// 1. an account already linked to this provider identity is returned as is;
/// 2. an account with the same email that has no provider link yet is linked in
///    place (its password, if any, keeps working); one already linked to another
///    provider is returned unchanged;
/// 3. otherwise a new verified, password-less account is created.
pub async fn resolve_identity(
    store: &dyn UserStore,
    profile: &FederatedProfile,
) -> Result<User, AppError> {
    match lookup_or_create(store, profile).await {
        // Lost a creation race with a concurrent callback for the same email.
        Err(AppError::DuplicateEmail) => lookup_or_create(store, profile).await,
        result => result,
    }
}

async fn lookup_or_create(
    store: &dyn UserStore,
    profile: &FederatedProfile,
) -> Result<User, AppError> {
    if let Some(user) = store
        .find_by_provider_identity(profile.provider, &profile.provider_id)
        .await?
    {
        return Ok(user);
    }

    let email = profile.effective_email();

    if let Some(user) = store.find_by_email(&email).await? {
        if user.provider_id.is_some() {
            return Ok(user);
        }
        let update = UserUpdate {
            provider: Some(profile.provider),
            provider_id: Some(Some(profile.provider_id.clone())),
            avatar: Some(profile.avatar.clone().or(user.avatar.clone())),
            is_email_verified: Some(true),
            ..Default::default()
        };
        let linked = store.update(user.id, update).await?;
        info!(
            "linked user {} to {} identity",
            linked.id,
            profile.provider.display_name()
        );
        return Ok(linked);
    }

    let user = store
        .create(NewUser {
            name: profile.effective_name(&email),
            email,
            password_hash: None,
            provider: profile.provider,
            provider_id: Some(profile.provider_id.clone()),
            is_email_verified: true,
            avatar: profile.avatar.clone(),
        })
        .await?;
    info!(
        "created user {} from {} login",
        user.id,
        profile.provider.display_name()
    );
    Ok(user)
}
