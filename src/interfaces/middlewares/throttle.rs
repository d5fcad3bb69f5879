use actix_web::{
    body::BoxBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, ResponseError,
};
use futures_util::future::{ok, Ready, LocalBoxFuture};
use std::{rc::Rc, str::FromStr, task::{Context, Poll}};

use crate::{
    errors::AppError,
    limiter::rate_limiter::{Rate, RateLimiterStore},
    settings::{AppConfig, ThrottleRates},
    utils::get_client_ip::get_client_ip,
    AppState,
};

const IMAGES_PREFIX: &str = "/api/v1/images";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleScope {
    /// Collection: list and create.
    List,
    /// Single record: read, update, delete, picture.
    Detail,
    /// Record actions such as resize.
    Action,
}

impl ThrottleScope {
    pub fn classify(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        let rest = path.strip_prefix(IMAGES_PREFIX)?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(ThrottleScope::List),
            [_id] | [_id, "picture"] => Some(ThrottleScope::Detail),
            [_id, _action] => Some(ThrottleScope::Action),
            _ => None,
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            ThrottleScope::List => "list",
            ThrottleScope::Detail => "detail",
            ThrottleScope::Action => "action",
        }
    }
}

/// One limiter store per scope, keyed by client IP.
#[derive(Clone)]
pub struct Throttles {
    list: RateLimiterStore,
    detail: RateLimiterStore,
    action: RateLimiterStore,
    trust_x_forwarded_for: bool,
}

impl Throttles {
    pub fn new(rates: &ThrottleRates, trust_x_forwarded_for: bool) -> Result<Self, AppError> {
        let parse = |scope: &str, value: &str| {
            Rate::from_str(value)
                .map_err(|e| AppError::InternalError(format!("throttle {}: {}", scope, e)))
        };

        Ok(Self {
            list: RateLimiterStore::new(
                parse("list_burst", &rates.list_burst)?,
                parse("list_sustained", &rates.list_sustained)?,
            ),
            detail: RateLimiterStore::new(
                parse("detail_burst", &rates.detail_burst)?,
                parse("detail_sustained", &rates.detail_sustained)?,
            ),
            action: RateLimiterStore::new(
                parse("action_burst", &rates.action_burst)?,
                parse("action_sustained", &rates.action_sustained)?,
            ),
            trust_x_forwarded_for,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(&config.throttle, config.trust_x_forwarded_for)
    }

    /// Starts idle-bucket eviction for every scope.
    pub fn spawn_eviction(&self) {
        self.list.spawn_eviction();
        self.detail.spawn_eviction();
        self.action.spawn_eviction();
    }

    pub fn store(&self, scope: ThrottleScope) -> &RateLimiterStore {
        match scope {
            ThrottleScope::List => &self.list,
            ThrottleScope::Detail => &self.detail,
            ThrottleScope::Action => &self.action,
        }
    }

    /// `Err(retry_after_secs)` when the request must be rejected.
    pub fn check(&self, req: &ServiceRequest) -> Result<(), u64> {
        let Some(scope) = ThrottleScope::classify(req.path()) else {
            return Ok(());
        };
        let ip = get_client_ip(req, self.trust_x_forwarded_for);
        self.store(scope).check(&format!("{}:{}", scope.key_prefix(), ip))
    }
}

pub struct ThrottleMiddleware;

impl<S> Transform<S, ServiceRequest> for ThrottleMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = ThrottleMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(ThrottleMiddlewareService {
            service: Rc::new(service),
        })
    }
}

pub struct ThrottleMiddlewareService<S> {
    service: Rc<S>,
}

impl<S> Service<ServiceRequest> for ThrottleMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<BoxBody>, Error = Error> + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let verdict = match req.app_data::<web::Data<AppState>>() {
                Some(state) => state.throttles.check(&req),
                None => {
                    tracing::error!("AppState missing in throttle middleware");
                    Ok(())
                }
            };

            if let Err(retry_after) = verdict {
                tracing::warn!(path = %req.path(), retry_after, "request throttled");
                let response = AppError::RateLimited { retry_after }.error_response();
                return Ok(req.into_response(response));
            }

            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_image_paths() {
        assert_eq!(ThrottleScope::classify("/api/v1/images"), Some(ThrottleScope::List));
        assert_eq!(ThrottleScope::classify("/api/v1/images/"), Some(ThrottleScope::List));
        assert_eq!(ThrottleScope::classify("/api/v1/images/4"), Some(ThrottleScope::Detail));
        assert_eq!(ThrottleScope::classify("/api/v1/images/4/picture"), Some(ThrottleScope::Detail));
        assert_eq!(ThrottleScope::classify("/api/v1/images/4/resize/"), Some(ThrottleScope::Action));
        assert_eq!(ThrottleScope::classify("/api/v1/admin/health"), None);
        assert_eq!(ThrottleScope::classify("/"), None);
    }
}
