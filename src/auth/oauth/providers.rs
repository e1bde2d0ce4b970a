//! OAuth 2.0 authorization-code handshakes with Google and GitHub.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use serde::{de::DeserializeOwned, Deserialize};

use super::FederatedProfile;
use crate::config::{Config, OAuthClientConfig};
use crate::error::AppError;
use crate::models::AuthProvider;

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URI: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const GITHUB_AUTH_URI: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URI: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URI: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URI: &str = "https://api.github.com/user/emails";
const GITHUB_USER_AGENT: &str = "taskmaster-auth";

/// One provider's side of the OAuth round trip.
#[async_trait]
pub trait OAuthClient: Send + Sync {
    fn provider(&self) -> AuthProvider;

    /// URL the browser is sent to; `state` comes back on the callback.
    fn authorize_url(&self, state: &str) -> String;

    /// Trades the callback `code` for the provider's view of the user.
    async fn exchange(&self, code: &str) -> Result<FederatedProfile, AppError>;
}

/// The OAuth clients enabled for this deployment.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    clients: HashMap<AuthProvider, Arc<dyn OAuthClient>>,
}

impl OAuthProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the providers whose client id and secret are configured.
    pub fn from_config(config: &Config) -> Self {
        let http = reqwest::Client::new();
        let mut providers = Self::new();
        if let Some(google) = &config.google {
            providers = providers.with(Arc::new(GoogleOAuth::new(google.clone(), http.clone())));
        }
        if let Some(github) = &config.github {
            providers = providers.with(Arc::new(GitHubOAuth::new(github.clone(), http)));
        }
        providers
    }

    pub fn with(mut self, client: Arc<dyn OAuthClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    pub fn get(&self, provider: AuthProvider) -> Option<Arc<dyn OAuthClient>> {
        self.clients.get(&provider).cloned()
    }
}

fn build_url(base: &str, params: &[(&str, &str)]) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", base, query)
}

fn handshake_error(
    provider: AuthProvider,
    stage: &str,
    detail: impl std::fmt::Display,
) -> AppError {
    warn!(
        "{} OAuth {} failed: {}",
        provider.display_name(),
        stage,
        detail
    );
    AppError::Unauthorized(format!("{} authentication failed", provider.display_name()))
}

async fn read_json<T: DeserializeOwned>(
    provider: AuthProvider,
    stage: &str,
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(handshake_error(
            provider,
            stage,
            format!("{}: {}", status, body),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| handshake_error(provider, stage, e))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleOAuth {
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl GoogleOAuth {
    pub fn new(config: OAuthClientConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }
}

#[async_trait]
impl OAuthClient for GoogleOAuth {
    fn provider(&self) -> AuthProvider {
        AuthProvider::Google
    }

    fn authorize_url(&self, state: &str) -> String {
        build_url(
            GOOGLE_AUTH_URI,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
    }

    async fn exchange(&self, code: &str) -> Result<FederatedProfile, AppError> {
        let provider = self.provider();
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let response = self
            .http
            .post(GOOGLE_TOKEN_URI)
            .form(&params)
            .send()
            .await
            .map_err(|e| handshake_error(provider, "token exchange", e))?;
        let token: TokenResponse = read_json(provider, "token exchange", response).await?;

        let response = self
            .http
            .get(GOOGLE_USERINFO_URI)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| handshake_error(provider, "profile fetch", e))?;
        let info: GoogleUserInfo = read_json(provider, "profile fetch", response).await?;

        Ok(FederatedProfile {
            provider,
            provider_id: info.id,
            email: info.email,
            display_name: info.name,
            username: None,
            avatar: info.picture,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// The primary verified address, falling back to any verified one.
fn pick_github_email(emails: &[GitHubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

pub struct GitHubOAuth {
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl GitHubOAuth {
    pub fn new(config: OAuthClientConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    async fn fetch_emails(&self, access_token: &str) -> Option<String> {
        let response = self
            .http
            .get(GITHUB_EMAILS_URI)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, GITHUB_USER_AGENT)
            .send()
            .await
            .ok()?;
        let emails: Vec<GitHubEmail> = read_json(self.provider(), "email fetch", response)
            .await
            .ok()?;
        pick_github_email(&emails)
    }
}

#[async_trait]
impl OAuthClient for GitHubOAuth {
    fn provider(&self) -> AuthProvider {
        AuthProvider::Github
    }

    fn authorize_url(&self, state: &str) -> String {
        build_url(
            GITHUB_AUTH_URI,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", "user:email"),
                ("state", state),
            ],
        )
    }

    async fn exchange(&self, code: &str) -> Result<FederatedProfile, AppError> {
        let provider = self.provider();
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let response = self
            .http
            .post(GITHUB_TOKEN_URI)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| handshake_error(provider, "token exchange", e))?;
        let token: TokenResponse = read_json(provider, "token exchange", response).await?;

        let response = self
            .http
            .get(GITHUB_USER_URI)
            .bearer_auth(&token.access_token)
            .header(reqwest::header::USER_AGENT, GITHUB_USER_AGENT)
            .send()
            .await
            .map_err(|e| handshake_error(provider, "profile fetch", e))?;
        let user: GitHubUser = read_json(provider, "profile fetch", response).await?;

        // The public profile email is often hidden; the emails endpoint is not.
        let email = match user.email {
            Some(email) => Some(email),
            None => self.fetch_emails(&token.access_token).await,
        };

        Ok(FederatedProfile {
            provider,
            provider_id: user.id.to_string(),
            email,
            display_name: user.name,
            username: Some(user.login),
            avatar: user.avatar_url,
        })
    }
}
