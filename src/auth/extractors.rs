use actix_web::dev::Payload;
use actix_web::{web, Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::auth::middleware::BearerAuth;
use crate::auth::service::AuthService;
use crate::error::AppError;
use crate::models::User;

/// Extracts the authenticated user's ID from request extensions.
///
/// This extractor is intended to be used on routes behind `AuthMiddleware`,
/// which validates the bearer token and records the result in the request
/// extensions. A missing header, or no middleware at all, is `Unauthorized`;
/// an expired token is `TokenExpired`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUserId(pub Uuid);

fn authenticated_user_id(req: &HttpRequest) -> Result<Uuid, AppError> {
    match req.extensions().get::<BearerAuth>() {
        Some(BearerAuth::Valid(claims)) => Ok(claims.sub),
        Some(BearerAuth::Rejected(e)) => Err(AppError::from(*e)),
        None => Err(AppError::Unauthorized(
            "Not authorized to access this route".to_string(),
        )),
    }
}

impl FromRequest for AuthenticatedUserId {
    type Error = ActixError; // AppError will be converted into ActixError via ResponseError
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            authenticated_user_id(req)
                .map(AuthenticatedUserId)
                .map_err(ActixError::from),
        )
    }
}

/// Like [`AuthenticatedUserId`], but also loads the account and refuses users
/// who have not confirmed their email address yet.
#[derive(Debug, Clone)]
pub struct RequireVerifiedEmail(pub User);

impl FromRequest for RequireVerifiedEmail {
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = authenticated_user_id(req);
        let service = req.app_data::<web::Data<AuthService>>().cloned();

        Box::pin(async move {
            let user_id = user_id?;
            let service = service.ok_or_else(|| {
                AppError::InternalServerError("AuthService is not registered".into())
            })?;
            let user = service.me(user_id).await?;
            if !user.is_email_verified {
                return Err(AppError::Forbidden(
                    "Please verify your email to access this resource".into(),
                )
                .into());
            }
            Ok(RequireVerifiedEmail(user))
        })
    }
}
