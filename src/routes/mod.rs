pub mod auth;
pub mod health;
pub mod oauth;

use actix_web::web;

use crate::error::AppError;

/// Registers the `/auth` routes. Mounted under `/api` by the binary.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/auth")
            .service(auth::register)
            .service(auth::login)
            .service(auth::me)
            .service(auth::refresh)
            .service(auth::logout)
            .service(
                web::resource(["/forgotpassword", "/forgot-password"])
                    .route(web::post().to(auth::forgot_password)),
            )
            .service(
                web::resource("/resetpassword/{token}")
                    .route(web::put().to(auth::reset_password))
                    .route(web::post().to(auth::reset_password)),
            )
            .service(
                web::resource("/reset-password/{token}")
                    .route(web::post().to(auth::reset_password)),
            )
            .service(auth::verify_email)
            .service(auth::resend_verification)
            .service(auth::login_failed)
            .service(oauth::google_login)
            .service(oauth::google_callback)
            .service(oauth::github_login)
            .service(oauth::github_callback),
    );
}

/// Malformed or incomplete JSON bodies are reported like any other validation
/// failure: 400 with the `{success, error}` body.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into())
}
