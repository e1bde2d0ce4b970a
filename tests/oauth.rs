#[macro_use]
mod common;

use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::http::StatusCode;
use actix_web::test;
use pretty_assertions::assert_eq;

use common::{
    context, context_with, login, register, send, settings, FakeOAuth, FRONTEND_URL,
};
use taskmaster_auth::auth::oauth::{FederatedProfile, OAuthProviders};
use taskmaster_auth::auth::AuthSettings;
use taskmaster_auth::models::AuthProvider;
use taskmaster_auth::routes::auth::REFRESH_COOKIE;
use taskmaster_auth::routes::oauth::STATE_COOKIE;
use taskmaster_auth::store::UserStore;

fn google_profile(email: Option<&str>) -> FederatedProfile {
    FederatedProfile {
        provider: AuthProvider::Google,
        provider_id: "g-123".into(),
        email: email.map(str::to_string),
        display_name: Some("Grace".into()),
        username: None,
        avatar: Some("https://img.example/grace.png".into()),
    }
}

fn google_context(settings: AuthSettings, email: Option<&str>) -> common::TestContext {
    let providers = OAuthProviders::new().with(Arc::new(FakeOAuth {
        profile: google_profile(email),
    }));
    context_with(settings, providers)
}

#[actix_rt::test]
async fn test_disabled_provider_is_not_found() {
    let ctx = context();
    let app = test_app!(ctx);

    for uri in ["/api/auth/google", "/api/auth/github/callback?code=good&state=x"] {
        let req = test::TestRequest::get().uri(uri).to_request();
        let reply = send(&app, req).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{}: {:?}", uri, reply.raw);
    }
}

#[actix_rt::test]
async fn test_google_login_redirect_flow() {
    let ctx = google_context(settings(), Some("grace@x.com"));
    let app = test_app!(ctx);

    let req = test::TestRequest::get().uri("/api/auth/google").to_request();
    let begin = send(&app, req).await;
    assert_eq!(begin.status, StatusCode::FOUND);
    let state = begin.cookie(STATE_COOKIE).expect("state cookie not set");
    assert_eq!(state.path(), Some("/api/auth"));
    assert_eq!(state.http_only(), Some(true));
    let location = begin.location.unwrap();
    assert!(location.ends_with(&format!("state={}", state.value())), "{}", location);

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/auth/google/callback?code=good&state={}",
            state.value()
        ))
        .cookie(state.clone())
        .to_request();
    let callback = send(&app, req).await;
    assert_eq!(callback.status, StatusCode::FOUND, "Body: {:?}", callback.raw);
    let location = callback.location.clone().unwrap();
    assert!(
        location.starts_with(&format!("{}/oauth-success?token=", FRONTEND_URL)),
        "unexpected redirect {}",
        location
    );
    assert!(callback.cookie(REFRESH_COOKIE).is_some());
    assert_eq!(callback.cookie(STATE_COOKIE).unwrap().value(), "");

    let user = ctx.store.find_by_email("grace@x.com").await.unwrap().unwrap();
    assert_eq!(user.provider, AuthProvider::Google);
    assert_eq!(user.provider_id.as_deref(), Some("g-123"));
    assert!(user.is_email_verified);
    assert!(user.password_hash.is_none());
}

#[actix_rt::test]
async fn test_callback_failures_redirect_to_login_failed() {
    let ctx = google_context(settings(), Some("grace@x.com"));
    let app = test_app!(ctx);

    let cases = [
        ("code=good&state=forged", Some("real-state"), "state mismatch"),
        ("code=good&state=real-state", None, "missing state cookie"),
        ("code=bad&state=real-state", Some("real-state"), "rejected code"),
        ("error=access_denied&state=real-state", Some("real-state"), "user denied"),
    ];

    for (query, cookie, description) in cases {
        let mut req = test::TestRequest::get().uri(&format!("/api/auth/google/callback?{}", query));
        if let Some(value) = cookie {
            req = req.cookie(Cookie::new(STATE_COOKIE, value));
        }
        let reply = send(&app, req.to_request()).await;
        assert_eq!(reply.status, StatusCode::FOUND, "{}", description);
        assert_eq!(
            reply.location.as_deref(),
            Some("/api/auth/login/failed"),
            "{}",
            description
        );
    }

    assert!(ctx.store.find_by_email("grace@x.com").await.unwrap().is_none());

    let req = test::TestRequest::get().uri("/api/auth/login/failed").to_request();
    let failed = send(&app, req).await;
    assert_eq!(failed.status, StatusCode::UNAUTHORIZED);
    assert_eq!(failed.body["error"], "OAuth authentication failed");
}

#[actix_rt::test]
async fn test_json_mode_is_idempotent_and_uses_placeholder_email() {
    let mut settings = settings();
    settings.oauth_success_redirect = false;
    let ctx = google_context(settings, None);
    let app = test_app!(ctx);

    let mut ids = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/api/auth/google/callback?code=good&state=s1")
            .cookie(Cookie::new(STATE_COOKIE, "s1"))
            .to_request();
        let reply = send(&app, req).await;
        assert_eq!(reply.status, StatusCode::OK, "Body: {:?}", reply.raw);
        assert!(!reply.str("accessToken").is_empty());
        assert_eq!(reply.body["user"]["email"], "g-123@google.user");
        ids.push(reply.body["user"]["id"].clone());
    }
    assert_eq!(ids[0], ids[1]);

    let req = test::TestRequest::get()
        .uri("/api/auth/google/callback?code=bad&state=s1")
        .cookie(Cookie::new(STATE_COOKIE, "s1"))
        .to_request();
    let rejected = send(&app, req).await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_oauth_links_existing_local_account() {
    let mut settings = settings();
    settings.oauth_success_redirect = false;
    let ctx = google_context(settings, Some("Grace@X.com"));
    let app = test_app!(ctx);

    let local = register(&app, "Grace", "grace@x.com", "secret1").await;
    let local_id = local.body["user"]["id"].clone();

    let req = test::TestRequest::get()
        .uri("/api/auth/google/callback?code=good&state=s1")
        .cookie(Cookie::new(STATE_COOKIE, "s1"))
        .to_request();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "Body: {:?}", reply.raw);
    assert_eq!(reply.body["user"]["id"], local_id);
    assert_eq!(reply.body["user"]["isEmailVerified"], true);

    let user = ctx.store.find_by_email("grace@x.com").await.unwrap().unwrap();
    assert_eq!(user.provider, AuthProvider::Google);
    assert_eq!(user.provider_id.as_deref(), Some("g-123"));
    assert_eq!(user.avatar.as_deref(), Some("https://img.example/grace.png"));

    // The password still works after the account is linked.
    let local_login = login(&app, "grace@x.com", "secret1").await;
    assert_eq!(
        local_login.status,
        StatusCode::OK,
        "Local login failed after linking. Body: {:?}",
        local_login.raw
    );
    assert_eq!(local_login.body["user"]["id"], local_id);
}
