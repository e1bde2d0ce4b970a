use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::auth::service::AuthService;
use crate::auth::token::{Claims, TokenError};
use crate::error::AppError;

/// Outcome of checking the `Authorization: Bearer` header, stored in the
/// request extensions. Nothing is stored when the header is absent.
#[derive(Debug, Clone)]
pub enum BearerAuth {
    Valid(Claims),
    Rejected(TokenError),
}

/// Decodes the bearer access token once per request.
///
/// The middleware never rejects a request by itself: public endpoints keep
/// working with a stale header, and the [`AuthenticatedUserId`] extractor turns
/// a missing or rejected token into a 401 on protected ones.
///
/// [`AuthenticatedUserId`]: crate::auth::extractors::AuthenticatedUserId
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        if let Some(token) = bearer {
            let auth = match req.app_data::<web::Data<AuthService>>() {
                Some(service) => service.tokens().verify_access_token(&token),
                None => {
                    let app_err =
                        AppError::InternalServerError("AuthService is not registered".into());
                    return Box::pin(async move { Err(app_err.into()) });
                }
            };
            let state = match auth {
                Ok(claims) => BearerAuth::Valid(claims),
                Err(e) => BearerAuth::Rejected(e),
            };
            req.extensions_mut().insert(state);
        }

        let fut = self.service.call(req);
        Box::pin(fut)
    }
}
