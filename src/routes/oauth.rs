use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get, http::header, web, HttpRequest, HttpResponse, ResponseError,
};
use log::warn;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use super::auth::{refresh_cookie, session_response};
use crate::{
    auth::{
        oauth::{OAuthClient, OAuthProviders},
        secret::random_token,
        AuthService, SessionTokens,
    },
    config::RefreshTransport,
    error::AppError,
    models::AuthProvider,
};
use std::sync::Arc;

/// httpOnly cookie holding the CSRF `state` between the redirect and the callback.
pub const STATE_COOKIE: &str = "oauth_state";
const STATE_COOKIE_PATH: &str = "/api/auth";
const LOGIN_FAILED_PATH: &str = "/api/auth/login/failed";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn enabled(
    providers: &OAuthProviders,
    provider: AuthProvider,
) -> Result<Arc<dyn OAuthClient>, AppError> {
    providers.get(provider).ok_or_else(|| {
        AppError::NotFound(format!("{} login is not enabled", provider.display_name()))
    })
}

fn state_cookie(value: String, secure: bool) -> Cookie<'static> {
    // Lax so the cookie survives the top-level redirect back from the provider.
    Cookie::build(STATE_COOKIE, value)
        .path(STATE_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(CookieDuration::minutes(10))
        .finish()
}

fn begin(
    provider: AuthProvider,
    providers: &OAuthProviders,
    service: &AuthService,
) -> Result<HttpResponse, AppError> {
    let client = enabled(providers, provider)?;
    let state = random_token()?;
    let location = client.authorize_url(&state);

    Ok(HttpResponse::Found()
        .append_header((header::LOCATION, location))
        .cookie(state_cookie(state, service.settings().cookie_secure))
        .finish())
}

async fn complete(
    client: &dyn OAuthClient,
    req: &HttpRequest,
    query: CallbackQuery,
    service: &AuthService,
) -> Result<SessionTokens, AppError> {
    let provider = client.provider().display_name();
    if let Some(error) = query.error {
        return Err(AppError::Unauthorized(format!(
            "{} login was not completed: {}",
            provider, error
        )));
    }

    let expected = req
        .cookie(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("OAuth state cookie missing".into()))?;
    let state = query.state.unwrap_or_default();
    if !bool::from(expected.as_bytes().ct_eq(state.as_bytes())) {
        return Err(AppError::Unauthorized("OAuth state mismatch".into()));
    }

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Unauthorized("OAuth code missing".into()))?;
    let profile = client.exchange(&code).await?;
    service.oauth_login(profile).await
}

fn success_response(service: &AuthService, session: SessionTokens) -> HttpResponse {
    let settings = service.settings();
    if !settings.oauth_success_redirect {
        return session_response(HttpResponse::Ok(), service, session);
    }

    let location = format!(
        "{}/oauth-success?token={}",
        settings.frontend_url,
        urlencoding::encode(&session.access_token)
    );
    let mut builder = HttpResponse::Found();
    builder.append_header((header::LOCATION, location));
    if settings.refresh_transport == RefreshTransport::Cookie {
        let max_age = CookieDuration::seconds(service.tokens().refresh_ttl().num_seconds());
        builder.cookie(refresh_cookie(settings, session.refresh_token, max_age));
    }
    builder.finish()
}

async fn finish(
    provider: AuthProvider,
    req: HttpRequest,
    query: CallbackQuery,
    providers: &OAuthProviders,
    service: &AuthService,
) -> Result<HttpResponse, AppError> {
    let client = enabled(providers, provider)?;

    let mut response = match complete(client.as_ref(), &req, query, service).await {
        Ok(session) => success_response(service, session),
        Err(e) => {
            warn!("{} login failed: {}", provider.display_name(), e);
            if service.settings().oauth_success_redirect {
                HttpResponse::Found()
                    .append_header((header::LOCATION, LOGIN_FAILED_PATH))
                    .finish()
            } else {
                e.error_response()
            }
        }
    };

    let mut spent = state_cookie(String::new(), service.settings().cookie_secure);
    spent.make_removal();
    if let Err(e) = response.add_cookie(&spent) {
        warn!("could not clear OAuth state cookie: {}", e);
    }
    Ok(response)
}

/// Start a Google login
///
/// Redirects to Google's consent screen.
#[get("/google")]
pub async fn google_login(
    providers: web::Data<OAuthProviders>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    begin(AuthProvider::Google, &providers, &service)
}

#[get("/google/callback")]
pub async fn google_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    providers: web::Data<OAuthProviders>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    finish(
        AuthProvider::Google,
        req,
        query.into_inner(),
        &providers,
        &service,
    )
    .await
}

/// Start a GitHub login
///
/// Redirects to GitHub's authorization page.
#[get("/github")]
pub async fn github_login(
    providers: web::Data<OAuthProviders>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    begin(AuthProvider::Github, &providers, &service)
}

#[get("/github/callback")]
pub async fn github_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    providers: web::Data<OAuthProviders>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    finish(
        AuthProvider::Github,
        req,
        query.into_inner(),
        &providers,
        &service,
    )
    .await
}
