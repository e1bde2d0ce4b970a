//! The authentication flows.
//!
//! `AuthService` ties the credential store, password hashing, session tokens,
//! single-use secret tokens and mail delivery together. Handlers translate HTTP
//! into calls on it and never touch those pieces directly.

use std::sync::Arc;

use log::{info, warn};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use super::oauth::{resolve_identity, FederatedProfile};
use super::password::PasswordHasher;
use super::secret::{SecretPurpose, SecretTokens};
use super::token::TokenIssuer;
use super::{
    normalize_email, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, RefreshTransport};
use crate::error::AppError;
use crate::mail::{self, Mailer};
use crate::models::{AuthProvider, NewUser, User, UserUpdate};
use crate::store::UserStore;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Behaviour switches for the flows.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Base URL of the web client, used in email links.
    pub frontend_url: String,
    /// Send a verification email on registration.
    pub send_verification_email: bool,
    /// Return the cleartext reset token from forgot-password. Development only.
    pub expose_reset_token: bool,
    pub refresh_transport: RefreshTransport,
    /// Mark session cookies `Secure`.
    pub cookie_secure: bool,
    /// Finish OAuth logins with a redirect to the web client instead of JSON.
    pub oauth_success_redirect: bool,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frontend_url: config.frontend_url.clone(),
            send_verification_email: config.send_verification_email,
            expose_reset_token: config.expose_reset_token,
            refresh_transport: config.refresh_transport,
            cookie_secure: config.cookie_secure,
            oauth_success_redirect: config.oauth_success_redirect,
        }
    }
}

/// A freshly started session.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Default)]
pub struct ForgotPasswordOutcome {
    /// Set only when `AuthSettings::expose_reset_token` is on.
    pub reset_token: Option<String>,
}

pub struct AuthService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    secrets: SecretTokens,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    settings: AuthSettings,
}

fn clear_secret(purpose: SecretPurpose) -> UserUpdate {
    match purpose {
        SecretPurpose::PasswordReset => UserUpdate::reset_password(None),
        SecretPurpose::EmailVerification => UserUpdate::email_verification(None),
    }
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        secrets: SecretTokens,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            secrets,
            mailer,
            clock,
            settings,
        }
    }

    /// Wires the service from configuration, with the system clock and the
    /// configured mailer.
    pub fn from_config(config: &Config, store: Arc<dyn UserStore>) -> Self {
        Self::new(
            store,
            PasswordHasher::new(config.bcrypt_cost),
            TokenIssuer::new(&config.jwt),
            SecretTokens::new(
                config.reset_token_ttl_minutes,
                config.verification_token_ttl_minutes,
            ),
            mail::from_config(&config.mail),
            Arc::new(SystemClock),
            AuthSettings::from_config(config),
        )
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Creates a local account and signs it in.
    pub async fn register(&self, mut request: RegisterRequest) -> Result<SessionTokens, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Please add a name".into()));
        }
        let email = request.email.clone();

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AppError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash_async(request.password).await?;
        let user = self
            .store
            .create(NewUser {
                name: name.to_string(),
                email,
                password_hash: Some(password_hash),
                provider: AuthProvider::Local,
                provider_id: None,
                is_email_verified: false,
                avatar: None,
            })
            .await?;
        info!("registered user {}", user.id);

        if self.settings.send_verification_email {
            // The account exists either way; the user can ask for another email.
            if let Err(e) = self.send_verification(&user).await {
                warn!("verification email for user {} not sent: {}", user.id, e);
            }
        }

        self.start_session(user).await
    }

    pub async fn login(&self, mut request: LoginRequest) -> Result<SessionTokens, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        let user = match self.store.find_by_email(&request.email).await? {
            Some(user) => user,
            None => {
                warn!("failed login for unknown email");
                return Err(AppError::InvalidCredentials(INVALID_CREDENTIALS.into()));
            }
        };

        let password_hash = match &user.password_hash {
            Some(hash) => hash.clone(),
            None => {
                let provider = user.provider.display_name();
                return Err(AppError::InvalidCredentials(format!(
                    "This account signs in with {}. Please log in with {}.",
                    provider, provider
                )));
            }
        };

        if !self
            .hasher
            .verify_async(request.password, password_hash)
            .await?
        {
            warn!("failed login for user {}", user.id);
            return Err(AppError::InvalidCredentials(INVALID_CREDENTIALS.into()));
        }

        info!("user {} logged in", user.id);
        self.start_session(user).await
    }

    /// Issues a new access token for a live refresh token. The refresh token
    /// itself is not rotated.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<String, AppError> {
        let token = refresh_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Refresh token not found".into()))?;

        let claims = self.tokens.verify_refresh_token(token)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::TokenRevoked)?;
        let stored = user.refresh_token.as_deref().ok_or(AppError::TokenRevoked)?;
        if !bool::from(stored.as_bytes().ct_eq(token.as_bytes())) {
            warn!("superseded refresh token presented for user {}", user.id);
            return Err(AppError::TokenRevoked);
        }

        self.tokens.issue_access_token(user.id)
    }

    /// Drops the stored refresh token. Logging out twice, or after the account
    /// is gone, is not an error.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AppError> {
        match self
            .store
            .update(user_id, UserUpdate::refresh_token(None))
            .await
        {
            Ok(_) => {
                info!("user {} logged out", user_id);
                Ok(())
            }
            Err(AppError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn me(&self, user_id: Uuid) -> Result<User, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Emails a password-reset link.
    ///
    /// Unknown addresses answer `NotFound`, which reveals whether an account
    /// exists. Accounts without a password are pointed at their provider.
    pub async fn forgot_password(
        &self,
        mut request: ForgotPasswordRequest,
    ) -> Result<ForgotPasswordOutcome, AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;
        let email = request.email;

        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("No user found with that email".into())
            })?;

        if user.is_oauth_only() {
            return Err(AppError::BadRequest(format!(
                "This account signs in with {} and has no password to reset",
                user.provider.display_name()
            )));
        }

        let issued = self
            .secrets
            .issue(SecretPurpose::PasswordReset, self.clock.now())?;
        self.store
            .update(user.id, UserUpdate::reset_password(Some(issued.digest)))
            .await?;

        let message = mail::password_reset_email(
            &user.email,
            &self.settings.frontend_url,
            &issued.cleartext,
            self.secrets.ttl(SecretPurpose::PasswordReset),
        );
        if let Err(e) = self.mailer.send(&message).await {
            warn!("password reset email for user {} failed: {}", user.id, e);
            self.store
                .update(user.id, clear_secret(SecretPurpose::PasswordReset))
                .await?;
            return Err(e.into());
        }

        info!("password reset requested for user {}", user.id);
        Ok(ForgotPasswordOutcome {
            reset_token: self.settings.expose_reset_token.then(|| issued.cleartext),
        })
    }

    /// Sets a new password from a reset token and starts a new session.
    pub async fn reset_password(
        &self,
        token: &str,
        request: ResetPasswordRequest,
    ) -> Result<SessionTokens, AppError> {
        request.validate()?;
        let user = self
            .redeem_secret(token, SecretPurpose::PasswordReset)
            .await?;

        let password_hash = self.hasher.hash_async(request.password).await?;
        let user = self
            .store
            .update(
                user.id,
                UserUpdate {
                    password_hash: Some(Some(password_hash)),
                    ..Default::default()
                },
            )
            .await?;

        info!("password reset for user {}", user.id);
        self.start_session(user).await
    }

    pub async fn verify_email(&self, token: &str) -> Result<User, AppError> {
        let user = self
            .redeem_secret(token, SecretPurpose::EmailVerification)
            .await?;

        let user = self
            .store
            .update(
                user.id,
                UserUpdate {
                    is_email_verified: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        info!("email verified for user {}", user.id);
        Ok(user)
    }

    pub async fn resend_verification(&self, user_id: Uuid) -> Result<(), AppError> {
        let user = self.me(user_id).await?;
        if user.is_email_verified {
            return Err(AppError::AlreadyVerified);
        }
        self.send_verification(&user).await
    }

    /// Signs in the account matching an OAuth profile, creating or linking it
    /// first when needed.
    pub async fn oauth_login(&self, profile: FederatedProfile) -> Result<SessionTokens, AppError> {
        let user = resolve_identity(self.store.as_ref(), &profile).await?;
        info!(
            "user {} logged in with {}",
            user.id,
            profile.provider.display_name()
        );
        self.start_session(user).await
    }

    /// Issues both tokens and makes the new refresh token the only live one.
    async fn start_session(&self, user: User) -> Result<SessionTokens, AppError> {
        let access_token = self.tokens.issue_access_token(user.id)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;
        let user = self
            .store
            .update(
                user.id,
                UserUpdate::refresh_token(Some(refresh_token.clone())),
            )
            .await?;
        Ok(SessionTokens {
            access_token,
            refresh_token,
            user,
        })
    }

    /// Issues, stores and emails a verification token. A failed delivery
    /// clears the stored token again.
    async fn send_verification(&self, user: &User) -> Result<(), AppError> {
        let issued = self
            .secrets
            .issue(SecretPurpose::EmailVerification, self.clock.now())?;
        self.store
            .update(user.id, UserUpdate::email_verification(Some(issued.digest)))
            .await?;

        let message = mail::verification_email(
            &user.email,
            &self.settings.frontend_url,
            &issued.cleartext,
            self.secrets.ttl(SecretPurpose::EmailVerification),
        );
        if let Err(e) = self.mailer.send(&message).await {
            self.store
                .update(user.id, clear_secret(SecretPurpose::EmailVerification))
                .await?;
            return Err(e.into());
        }
        info!("verification email sent to user {}", user.id);
        Ok(())
    }

    /// Takes the `purpose` token off the account holding it and checks the
    /// expiry of what was taken. The token is gone afterwards whatever the
    /// outcome, so it can be redeemed at most once.
    async fn redeem_secret(&self, token: &str, purpose: SecretPurpose) -> Result<User, AppError> {
        let token = token.trim();
        let (user, digest) = self
            .store
            .take_secret(purpose, &SecretTokens::hash(token))
            .await?
            .ok_or(AppError::InvalidOrExpiredToken)?;

        if !SecretTokens::validate(token, &digest, self.clock.now()) {
            warn!("expired {:?} token used for user {}", purpose, user.id);
            return Err(AppError::InvalidOrExpiredToken);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::JwtConfig;
    use crate::mail::MemoryMailer;
    use crate::store::MemoryUserStore;
    use chrono::{Duration, Utc};

    struct Harness {
        service: AuthService,
        store: Arc<MemoryUserStore>,
        mailer: Arc<MemoryMailer>,
        clock: Arc<ManualClock>,
    }

    fn harness(send_verification_email: bool) -> Harness {
        let store = Arc::new(MemoryUserStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = AuthService::new(
            store.clone(),
            PasswordHasher::new(4),
            TokenIssuer::new(&JwtConfig {
                access_secret: "access-secret".into(),
                refresh_secret: "refresh-secret".into(),
                access_ttl_minutes: 60 * 24,
                refresh_ttl_minutes: 60 * 24 * 7,
            }),
            SecretTokens::default(),
            mailer.clone(),
            clock.clone(),
            AuthSettings {
                frontend_url: "http://localhost:3000".into(),
                send_verification_email,
                expose_reset_token: true,
                refresh_transport: RefreshTransport::Cookie,
                cookie_secure: false,
                oauth_success_redirect: true,
            },
        );
        Harness {
            service,
            store,
            mailer,
            clock,
        }
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "A".into(),
            email: "a@x.com".into(),
            password: "secret1".into(),
        }
    }

    fn login_request(password: &str) -> LoginRequest {
        LoginRequest {
            email: "a@x.com".into(),
            password: password.into(),
        }
    }

    /// Pulls the cleartext token out of the last emailed link.
    fn token_from_last_email(mailer: &MemoryMailer, path: &str) -> String {
        let html = mailer.last().unwrap().html;
        let start = html.find(path).unwrap() + path.len();
        html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }

    #[actix_rt::test]
    async fn test_register_then_login() {
        let h = harness(false);
        let session = h.service.register(register_request()).await.unwrap();

        assert_eq!(session.user.email, "a@x.com");
        assert!(!session.user.is_email_verified);
        assert_eq!(
            session.user.refresh_token.as_deref(),
            Some(session.refresh_token.as_str())
        );

        let session = h.service.login(login_request("secret1")).await.unwrap();
        assert!(!session.access_token.is_empty());
    }

    #[actix_rt::test]
    async fn test_register_normalizes_email_and_rejects_duplicates() {
        let h = harness(false);
        let mut request = register_request();
        request.email = " A@X.com ".into();
        let session = h.service.register(request).await.unwrap();
        assert_eq!(session.user.email, "a@x.com");

        let result = h.service.register(register_request()).await;
        assert!(matches!(result, Err(AppError::DuplicateEmail)));
    }

    #[actix_rt::test]
    async fn test_login_failures_share_a_message() {
        let h = harness(false);
        h.service.register(register_request()).await.unwrap();

        let wrong_password = h.service.login(login_request("wrong-pass")).await;
        let unknown = h
            .service
            .login(LoginRequest {
                email: "nobody@x.com".into(),
                password: "secret1".into(),
            })
            .await;

        match (wrong_password, unknown) {
            (Err(AppError::InvalidCredentials(a)), Err(AppError::InvalidCredentials(b))) => {
                assert_eq!(a, b)
            }
            other => panic!("unexpected results: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_login_names_provider_for_oauth_only_accounts() {
        let h = harness(false);
        h.service
            .oauth_login(FederatedProfile {
                provider: AuthProvider::Google,
                provider_id: "g-1".into(),
                email: Some("a@x.com".into()),
                display_name: Some("A".into()),
                username: None,
                avatar: None,
            })
            .await
            .unwrap();

        match h.service.login(login_request("secret1")).await {
            Err(AppError::InvalidCredentials(msg)) => assert!(msg.contains("Google")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_login_rotates_refresh_token() {
        let h = harness(false);
        let first = h.service.register(register_request()).await.unwrap();
        let second = h.service.login(login_request("secret1")).await.unwrap();

        assert!(h.service.refresh(Some(&second.refresh_token)).await.is_ok());
        assert!(matches!(
            h.service.refresh(Some(&first.refresh_token)).await,
            Err(AppError::TokenRevoked)
        ));
    }

    #[actix_rt::test]
    async fn test_refresh_after_logout_is_revoked() {
        let h = harness(false);
        let session = h.service.register(register_request()).await.unwrap();

        h.service.logout(session.user.id).await.unwrap();
        h.service.logout(session.user.id).await.unwrap();

        assert!(matches!(
            h.service.refresh(Some(&session.refresh_token)).await,
            Err(AppError::TokenRevoked)
        ));
        assert!(matches!(
            h.service.refresh(None).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_access_token_is_not_a_refresh_token() {
        let h = harness(false);
        let session = h.service.register(register_request()).await.unwrap();

        assert!(matches!(
            h.service.refresh(Some(&session.access_token)).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[actix_rt::test]
    async fn test_reset_password_flow() {
        let h = harness(false);
        let old = h.service.register(register_request()).await.unwrap();

        let outcome = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap();
        let token = outcome.reset_token.unwrap();
        assert_eq!(token, token_from_last_email(&h.mailer, "/resetpassword/"));

        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        let digest = stored.reset_password.unwrap();
        assert_ne!(digest.hash, token);
        assert_eq!(digest.expires_at, h.clock.now() + Duration::minutes(10));

        let session = h
            .service
            .reset_password(
                &token,
                ResetPasswordRequest {
                    password: "newsecret".into(),
                },
            )
            .await
            .unwrap();
        assert!(session.user.reset_password.is_none());

        // Single use, old session gone, new password works.
        let again = h
            .service
            .reset_password(
                &token,
                ResetPasswordRequest {
                    password: "another1".into(),
                },
            )
            .await;
        assert!(matches!(again, Err(AppError::InvalidOrExpiredToken)));
        assert!(matches!(
            h.service.refresh(Some(&old.refresh_token)).await,
            Err(AppError::TokenRevoked)
        ));
        assert!(h.service.login(login_request("secret1")).await.is_err());
        assert!(h.service.login(login_request("newsecret")).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_concurrent_resets_with_one_token_succeed_once() {
        let h = harness(false);
        h.service.register(register_request()).await.unwrap();
        let token = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap()
            .reset_token
            .unwrap();

        let (first, second) = futures::join!(
            h.service.reset_password(
                &token,
                ResetPasswordRequest {
                    password: "first-pw".into(),
                },
            ),
            h.service.reset_password(
                &token,
                ResetPasswordRequest {
                    password: "second-pw".into(),
                },
            )
        );

        let succeeded = [first.is_ok(), second.is_ok()];
        assert_eq!(succeeded.iter().filter(|ok| **ok).count(), 1);
        let failure = if first.is_ok() { second } else { first };
        assert!(matches!(failure, Err(AppError::InvalidOrExpiredToken)));
    }

    #[actix_rt::test]
    async fn test_concurrent_verifications_with_one_token_succeed_once() {
        let h = harness(true);
        h.service.register(register_request()).await.unwrap();
        let token = token_from_last_email(&h.mailer, "/verifyemail/");

        let (first, second) = futures::join!(
            h.service.verify_email(&token),
            h.service.verify_email(&token)
        );
        assert_eq!(
            [first.is_ok(), second.is_ok()]
                .iter()
                .filter(|ok| **ok)
                .count(),
            1
        );
    }

    #[actix_rt::test]
    async fn test_login_and_forgot_password_accept_padded_email() {
        let h = harness(false);
        h.service.register(register_request()).await.unwrap();

        let session = h
            .service
            .login(LoginRequest {
                email: "  A@X.COM ".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.user.email, "a@x.com");

        let outcome = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: " a@X.com".into(),
            })
            .await
            .unwrap();
        assert!(outcome.reset_token.is_some());
    }

    #[actix_rt::test]
    async fn test_expired_reset_token_is_cleared() {
        let h = harness(false);
        h.service.register(register_request()).await.unwrap();
        let token = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap()
            .reset_token
            .unwrap();

        h.clock.advance(Duration::minutes(11));

        let result = h
            .service
            .reset_password(
                &token,
                ResetPasswordRequest {
                    password: "newsecret".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::InvalidOrExpiredToken)));

        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.reset_password.is_none());
        assert!(h.service.login(login_request("secret1")).await.is_ok());
    }

    #[actix_rt::test]
    async fn test_forgot_password_delivery_failure_clears_token() {
        let h = harness(false);
        h.service.register(register_request()).await.unwrap();
        h.mailer.set_failing(true);

        let result = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "a@x.com".into(),
            })
            .await;
        assert!(matches!(result, Err(AppError::EmailDeliveryFailure(_))));

        let stored = h.store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.reset_password.is_none());
    }

    #[actix_rt::test]
    async fn test_forgot_password_unknown_and_oauth_only() {
        let h = harness(false);
        let unknown = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "nobody@x.com".into(),
            })
            .await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));

        h.service
            .oauth_login(FederatedProfile {
                provider: AuthProvider::Github,
                provider_id: "7".into(),
                email: None,
                display_name: None,
                username: Some("octo".into()),
                avatar: None,
            })
            .await
            .unwrap();
        let oauth_only = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "octo@github.user".into(),
            })
            .await;
        match oauth_only {
            Err(AppError::BadRequest(msg)) => assert!(msg.contains("GitHub")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_reset_token_hidden_unless_exposed() {
        let mut h = harness(false);
        h.service.settings.expose_reset_token = false;
        h.service.register(register_request()).await.unwrap();

        let outcome = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "a@x.com".into(),
            })
            .await
            .unwrap();
        assert!(outcome.reset_token.is_none());
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[actix_rt::test]
    async fn test_email_verification_flow() {
        let h = harness(true);
        let session = h.service.register(register_request()).await.unwrap();
        let token = token_from_last_email(&h.mailer, "/verifyemail/");

        let stored = h.store.find_by_id(session.user.id).await.unwrap().unwrap();
        assert_eq!(
            stored.email_verification.unwrap().expires_at,
            h.clock.now() + Duration::hours(24)
        );

        let user = h.service.verify_email(&token).await.unwrap();
        assert!(user.is_email_verified);
        assert!(user.email_verification.is_none());

        assert!(matches!(
            h.service.verify_email(&token).await,
            Err(AppError::InvalidOrExpiredToken)
        ));
        assert!(matches!(
            h.service.resend_verification(user.id).await,
            Err(AppError::AlreadyVerified)
        ));
    }

    #[actix_rt::test]
    async fn test_registration_survives_verification_delivery_failure() {
        let h = harness(true);
        h.mailer.set_failing(true);

        let session = h.service.register(register_request()).await.unwrap();
        let stored = h.store.find_by_id(session.user.id).await.unwrap().unwrap();
        assert!(stored.email_verification.is_none());

        let resend = h.service.resend_verification(session.user.id).await;
        assert!(matches!(resend, Err(AppError::EmailDeliveryFailure(_))));

        h.mailer.set_failing(false);
        h.service.resend_verification(session.user.id).await.unwrap();
        assert_eq!(h.mailer.sent().len(), 1);
    }
}
