use crate::{
    auth::{
        AuthResponse, AuthService, AuthSettings, AuthenticatedUserId, ForgotPasswordRequest,
        ForgotPasswordResponse, LoginRequest, MessageResponse, RefreshRequest, RefreshResponse,
        RegisterRequest, ResetPasswordRequest, SessionTokens, UserResponse,
    },
    config::RefreshTransport,
    error::AppError,
};
use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    get, post, web, HttpRequest, HttpResponse, HttpResponseBuilder,
};
use serde_json::json;

/// Name of the httpOnly cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

pub(crate) fn refresh_cookie(
    settings: &AuthSettings,
    value: String,
    max_age: CookieDuration,
) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(settings.cookie_secure)
        .max_age(max_age)
        .finish()
}

/// Attaches the refresh token (cookie or body, per configuration) and writes the
/// `{success, accessToken, user}` body.
pub(crate) fn session_response(
    mut builder: HttpResponseBuilder,
    service: &AuthService,
    session: SessionTokens,
) -> HttpResponse {
    let settings = service.settings();
    let refresh_token = match settings.refresh_transport {
        RefreshTransport::Cookie => {
            let max_age = CookieDuration::seconds(service.tokens().refresh_ttl().num_seconds());
            builder.cookie(refresh_cookie(settings, session.refresh_token, max_age));
            None
        }
        RefreshTransport::Body => Some(session.refresh_token),
    };

    builder.json(AuthResponse {
        success: true,
        access_token: session.access_token,
        refresh_token,
        user: session.user.profile(),
    })
}

/// Register a new user
///
/// Creates a local account, sends a verification email and starts a session.
#[post("/register")]
pub async fn register(
    service: web::Data<AuthService>,
    register_data: web::Json<RegisterRequest>,
) -> Result<HttpResponse, AppError> {
    let session = service.register(register_data.into_inner()).await?;
    Ok(session_response(HttpResponse::Created(), &service, session))
}

/// Login user
///
/// Authenticates with email and password and starts a session.
#[post("/login")]
pub async fn login(
    service: web::Data<AuthService>,
    login_data: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let session = service.login(login_data.into_inner()).await?;
    Ok(session_response(HttpResponse::Ok(), &service, session))
}

#[get("/me")]
pub async fn me(
    service: web::Data<AuthService>,
    user_id: AuthenticatedUserId,
) -> Result<HttpResponse, AppError> {
    let user = service.me(user_id.0).await?;
    Ok(HttpResponse::Ok().json(UserResponse {
        success: true,
        user: user.profile(),
    }))
}

/// Exchange a refresh token for a new access token
///
/// The token is read from the refresh cookie first, then from a
/// `{"refreshToken": "..."}` body.
#[post("/refresh")]
pub async fn refresh(
    req: HttpRequest,
    service: web::Data<AuthService>,
    body: Option<web::Json<RefreshRequest>>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token));

    let access_token = service.refresh(token.as_deref()).await?;
    Ok(HttpResponse::Ok().json(RefreshResponse {
        success: true,
        access_token,
    }))
}

#[post("/logout")]
pub async fn logout(
    service: web::Data<AuthService>,
    user_id: AuthenticatedUserId,
) -> Result<HttpResponse, AppError> {
    service.logout(user_id.0).await?;

    let mut cookie = refresh_cookie(service.settings(), String::new(), CookieDuration::ZERO);
    cookie.make_removal();
    Ok(HttpResponse::Ok().cookie(cookie).json(json!({
        "success": true,
        "data": {}
    })))
}

/// Request a password-reset email
///
/// Mounted at both `/forgotpassword` and `/forgot-password`.
pub async fn forgot_password(
    service: web::Data<AuthService>,
    forgot_data: web::Json<ForgotPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let outcome = service.forgot_password(forgot_data.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ForgotPasswordResponse {
        success: true,
        message: "Email sent".into(),
        reset_token: outcome.reset_token,
    }))
}

/// Set a new password with a reset token
///
/// Logs the user in on success.
pub async fn reset_password(
    service: web::Data<AuthService>,
    token: web::Path<String>,
    reset_data: web::Json<ResetPasswordRequest>,
) -> Result<HttpResponse, AppError> {
    let session = service
        .reset_password(&token.into_inner(), reset_data.into_inner())
        .await?;
    Ok(session_response(HttpResponse::Ok(), &service, session))
}

#[get("/verifyemail/{token}")]
pub async fn verify_email(
    service: web::Data<AuthService>,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    service.verify_email(&token.into_inner()).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Email verified successfully")))
}

#[post("/resendverification")]
pub async fn resend_verification(
    service: web::Data<AuthService>,
    user_id: AuthenticatedUserId,
) -> Result<HttpResponse, AppError> {
    service.resend_verification(user_id.0).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Verification email sent")))
}

/// Landing route for failed OAuth logins.
#[get("/login/failed")]
pub async fn login_failed() -> Result<HttpResponse, AppError> {
    Err(AppError::Unauthorized("OAuth authentication failed".into()))
}
