//!
//! # Custom Error Handling
//!
//! This module defines the custom error type `AppError` used throughout the service.
//! Every authentication flow returns `Result<_, AppError>`, and the HTTP layer relies on
//! the `actix_web::error::ResponseError` implementation to turn a failure into a
//! `{"success": false, "error": "..."}` body with the right status code. Nothing crosses
//! the HTTP boundary unhandled.
//!
//! `From` implementations exist for the error types of the crates the service leans on
//! (`sqlx`, `validator`, `jsonwebtoken`, `bcrypt`) so the `?` operator can be used freely.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use log::error;
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Represents all possible errors that can occur within the service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed input, short password (HTTP 400).
    #[error("Validation Error: {0}")]
    ValidationError(String),
    /// A request that is well-formed but cannot be honoured (HTTP 400).
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// Registration with an email that already belongs to an account (HTTP 400).
    #[error("Duplicate Email")]
    DuplicateEmail,
    /// Login failed. The message is identical for unknown email and wrong password;
    /// OAuth-only accounts get a message naming their provider (HTTP 401).
    #[error("Invalid Credentials: {0}")]
    InvalidCredentials(String),
    /// Missing or unusable authentication (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// A signed token whose expiry has passed (HTTP 401).
    #[error("Token Expired")]
    TokenExpired,
    /// A refresh token that is validly signed but no longer the stored one (HTTP 401).
    #[error("Token Revoked")]
    TokenRevoked,
    /// Authenticated, but not allowed to use the resource (HTTP 403).
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Password-reset or verification token that matches nothing or has expired (HTTP 400).
    #[error("Invalid Or Expired Token")]
    InvalidOrExpiredToken,
    /// Verification re-send for an already verified account (HTTP 400).
    #[error("Already Verified")]
    AlreadyVerified,
    /// Requested resource was not found (HTTP 404).
    #[error("Not Found: {0}")]
    NotFound(String),
    /// The mail collaborator failed; any secret token issued for the message has
    /// already been cleared (HTTP 500).
    #[error("Email Delivery Failure: {0}")]
    EmailDeliveryFailure(String),
    /// Errors originating from the record store (HTTP 500).
    #[error("Database Error: {0}")]
    DatabaseError(String),
    /// Unexpected server-side error (HTTP 500).
    #[error("Internal Server Error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// The message placed in the `error` field of the response body.
    ///
    /// Store and internal failures are logged with their detail and reported to the
    /// client with a generic message.
    pub fn client_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::BadRequest(msg)
            | AppError::InvalidCredentials(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::DuplicateEmail => "Email already registered. Please login.".into(),
            AppError::TokenExpired => "Token has expired".into(),
            AppError::TokenRevoked => "Refresh token has been revoked".into(),
            AppError::InvalidOrExpiredToken => "Invalid or expired token".into(),
            AppError::AlreadyVerified => "Email is already verified".into(),
            AppError::EmailDeliveryFailure(_) => "Email could not be sent".into(),
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "Server error".into(),
        }
    }
}

/// Converts `AppError` variants into `HttpResponse` objects.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::BadRequest(_)
            | AppError::DuplicateEmail
            | AppError::InvalidOrExpiredToken
            | AppError::AlreadyVerified => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials(_)
            | AppError::Unauthorized(_)
            | AppError::TokenExpired
            | AppError::TokenRevoked => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::EmailDeliveryFailure(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        }
        HttpResponse::build(status).json(json!({
            "success": false,
            "error": self.client_message()
        }))
    }
}

/// `sqlx::Error::RowNotFound` becomes `NotFound`; everything else is a database error.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            _ => AppError::DatabaseError(error.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// JWT failures outside the token issuer (which classifies them itself) are
/// treated as unauthenticated requests.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(format!("Invalid token: {}", error))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> AppError {
        AppError::InternalServerError(format!("Background task failed: {}", error))
    }
}
