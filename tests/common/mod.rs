#![allow(dead_code)]

use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::test;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use taskmaster_auth::auth::oauth::{FederatedProfile, OAuthClient, OAuthProviders};
use taskmaster_auth::auth::{AuthService, AuthSettings, PasswordHasher, SecretTokens, TokenIssuer};
use taskmaster_auth::clock::ManualClock;
use taskmaster_auth::config::{JwtConfig, RefreshTransport};
use taskmaster_auth::error::AppError;
use taskmaster_auth::mail::MemoryMailer;
use taskmaster_auth::models::AuthProvider;
use taskmaster_auth::store::MemoryUserStore;

pub const FRONTEND_URL: &str = "http://localhost:3000";

/// Everything a test needs to drive the API and inspect what happened behind it.
pub struct TestContext {
    pub service: actix_web::web::Data<AuthService>,
    pub providers: actix_web::web::Data<OAuthProviders>,
    pub store: Arc<MemoryUserStore>,
    pub mailer: Arc<MemoryMailer>,
    pub clock: Arc<ManualClock>,
}

pub fn settings() -> AuthSettings {
    AuthSettings {
        frontend_url: FRONTEND_URL.into(),
        send_verification_email: true,
        expose_reset_token: true,
        refresh_transport: RefreshTransport::Cookie,
        cookie_secure: false,
        oauth_success_redirect: true,
    }
}

pub fn context() -> TestContext {
    context_with(settings(), OAuthProviders::new())
}

pub fn context_with(settings: AuthSettings, providers: OAuthProviders) -> TestContext {
    let store = Arc::new(MemoryUserStore::new());
    let mailer = Arc::new(MemoryMailer::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let service = AuthService::new(
        store.clone(),
        PasswordHasher::new(4),
        TokenIssuer::new(&JwtConfig {
            access_secret: "integration-access-secret".into(),
            refresh_secret: "integration-refresh-secret".into(),
            access_ttl_minutes: 60 * 24,
            refresh_ttl_minutes: 60 * 24 * 7,
        }),
        SecretTokens::default(),
        mailer.clone(),
        clock.clone(),
        settings,
    );
    TestContext {
        service: actix_web::web::Data::new(service),
        providers: actix_web::web::Data::new(providers),
        store,
        mailer,
        clock,
    }
}

/// Builds the application the way the binary does, minus CORS.
macro_rules! test_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($ctx.service.clone())
                .app_data($ctx.providers.clone())
                .wrap(actix_web::middleware::Logger::default())
                .service(taskmaster_auth::routes::health::health)
                .service(taskmaster_auth::routes::health::index)
                .service(
                    actix_web::web::scope("/api")
                        .wrap(taskmaster_auth::auth::AuthMiddleware)
                        .configure(taskmaster_auth::routes::config),
                ),
        )
        .await
    };
}

/// Status, cookies, redirect target and parsed JSON body of a response.
pub struct Reply {
    pub status: StatusCode,
    pub cookies: Vec<Cookie<'static>>,
    pub location: Option<String>,
    pub body: Value,
    pub raw: String,
}

impl Reply {
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.cookies.iter().find(|c| c.name() == name).cloned()
    }

    pub fn str(&self, key: &str) -> String {
        self.body[key]
            .as_str()
            .unwrap_or_else(|| panic!("no string `{}` in {}", key, self.raw))
            .to_string()
    }
}

pub async fn send(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    req: actix_http::Request,
) -> Reply {
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let cookies = resp
        .response()
        .cookies()
        .map(|c| c.into_owned())
        .collect();
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = test::read_body(resp).await;
    Reply {
        status,
        cookies,
        location,
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        raw: String::from_utf8_lossy(&bytes).to_string(),
    }
}

pub async fn register(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    name: &str,
    email: &str,
    password: &str,
) -> Reply {
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "name": name, "email": email, "password": password }))
        .to_request();
    let reply = send(app, req).await;
    assert_eq!(
        reply.status,
        StatusCode::CREATED,
        "Registration failed. Body: {:?}",
        reply.raw
    );
    reply
}

pub async fn login(
    app: &impl actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
    >,
    email: &str,
    password: &str,
) -> Reply {
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": password }))
        .to_request();
    send(app, req).await
}

/// The token at the end of the last emailed link containing `path`.
pub fn token_from_last_email(mailer: &MemoryMailer, path: &str) -> String {
    let html = mailer.last().expect("no email was sent").html;
    let start = html.find(path).expect("link not found in email") + path.len();
    html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// OAuth client that skips the network: code `"good"` yields the profile,
/// anything else fails.
pub struct FakeOAuth {
    pub profile: FederatedProfile,
}

#[async_trait]
impl OAuthClient for FakeOAuth {
    fn provider(&self) -> AuthProvider {
        self.profile.provider
    }

    fn authorize_url(&self, state: &str) -> String {
        format!(
            "https://{}.example/authorize?state={}",
            self.profile.provider.as_str(),
            state
        )
    }

    async fn exchange(&self, code: &str) -> Result<FederatedProfile, AppError> {
        if code == "good" {
            Ok(self.profile.clone())
        } else {
            Err(AppError::Unauthorized("bad code".into()))
        }
    }
}
