//! API key middleware for the admin routes.
//!
//! Admin calls must carry the configured key as a bearer token:
//!
//! ```text
//! Authorization: Bearer <SPG_ADMIN_API_KEY>
//! ```
//!
//! If no key has been configured, every admin call is denied.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use storefront_common::Secret;

use crate::errors::{AuthError, ServerError};

pub struct AdminKeyMiddlewareFactory {
    key: Secret<String>,
}

impl AdminKeyMiddlewareFactory {
    pub fn new(key: Secret<String>) -> Self {
        AdminKeyMiddlewareFactory { key }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminKeyMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AdminKeyMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminKeyMiddlewareService { key: self.key.clone(), service: Rc::new(service) }))
    }
}

pub struct AdminKeyMiddlewareService<S> {
    key: Secret<String>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AdminKeyMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let verdict = check_api_key(&self.key, req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()));
        Box::pin(async move {
            match verdict {
                Ok(()) => {
                    trace!("💻️ Admin key check for {} ✅️", req.path());
                    service.call(req).await
                },
                Err(e) => {
                    warn!("💻️ Denying admin request for {}. {e}", req.path());
                    Err(ServerError::AuthenticationError(e).into())
                },
            }
        })
    }
}

/// Checks an `Authorization` header value against the admin key.
pub fn check_api_key(key: &Secret<String>, header: Option<&str>) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingApiKey)?;
    let candidate = header.strip_prefix("Bearer ").ok_or(AuthError::MissingApiKey)?.trim();
    if key.matches(candidate.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}
