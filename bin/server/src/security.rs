//! Rate limiting and input validation around handlers.
//!
//! [`SecurityLayer`] is a Tower layer applied per route. It is independent
//! of role resolution: it runs before the handler's extractors and only
//! looks at who is calling (client address) and what they sent.
//!
//! # Example
//!
//! ```ignore
//! Router::new()
//!     .route(
//!         "/api/user/role",
//!         get(role::get_role).layer(
//!             SecurityLayer::new(SecurityConfig::rate_limited(limit), store.clone()),
//!         ),
//!     )
//!     .route(
//!         "/api/dev/role",
//!         post(dev::set_role).layer(
//!             SecurityLayer::new(SecurityConfig::validated(), store)
//!                 .validate_json::<SetRoleRequest>(),
//!         ),
//!     );
//! ```

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use medislot_access::{RateLimitConfig, RateLimitDecision, RateLimitStore};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::error::ApiError;

/// Header carrying the original client address behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client identifier used when no address is known.
const ANONYMOUS_CLIENT: &str = "anonymous";

/// What the layer enforces.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityConfig {
    /// Fixed-window limit per client and route; `None` disables limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Reject bodies that fail schema validation before the handler runs.
    pub validate_input: bool,
}

impl SecurityConfig {
    /// Rate limiting only.
    #[must_use]
    pub fn rate_limited(limit: RateLimitConfig) -> Self {
        Self {
            rate_limit: Some(limit),
            validate_input: false,
        }
    }

    /// Input validation only.
    #[must_use]
    pub fn validated() -> Self {
        Self {
            rate_limit: None,
            validate_input: true,
        }
    }
}

/// An explicit request body schema.
pub trait InputSchema: DeserializeOwned + Send + 'static {
    /// Checks constraints the type system does not capture.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

type Validator = fn(&[u8]) -> Result<(), String>;

fn validate_as<T: InputSchema>(body: &[u8]) -> Result<(), String> {
    let value: T = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    value.validate()
}

fn validate_any_json(body: &[u8]) -> Result<(), String> {
    serde_json::from_slice::<serde_json::Value>(body)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[derive(Clone)]
struct Shared {
    config: SecurityConfig,
    store: Arc<dyn RateLimitStore>,
    validator: Validator,
    trust_forwarded_for: bool,
    max_body_bytes: usize,
}

/// Tower layer applying [`SecurityConfig`] to the wrapped route.
#[derive(Clone)]
pub struct SecurityLayer {
    shared: Arc<Shared>,
}

impl SecurityLayer {
    /// Creates a layer counting requests in `store`.
    pub fn new(config: SecurityConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                store,
                validator: validate_any_json,
                trust_forwarded_for: false,
                max_body_bytes: 16 * 1024,
            }),
        }
    }

    /// Validates bodies as `T` and enables input validation.
    #[must_use]
    pub fn validate_json<T: InputSchema>(self) -> Self {
        self.map(|shared| {
            shared.validator = validate_as::<T>;
            shared.config.validate_input = true;
        })
    }

    /// Uses the first `X-Forwarded-For` hop as the client identifier.
    #[must_use]
    pub fn trust_forwarded_for(self, trust: bool) -> Self {
        self.map(|shared| shared.trust_forwarded_for = trust)
    }

    /// Caps the body size read for validation.
    #[must_use]
    pub fn max_body_bytes(self, limit: usize) -> Self {
        self.map(|shared| shared.max_body_bytes = limit)
    }

    fn map(self, f: impl FnOnce(&mut Shared)) -> Self {
        let mut shared = Arc::unwrap_or_clone(self.shared);
        f(&mut shared);
        Self {
            shared: Arc::new(shared),
        }
    }
}

impl<S> Layer<S> for SecurityLayer {
    type Service = SecurityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityService {
            inner,
            shared: self.shared.clone(),
        }
    }
}

/// Service wrapper for [`SecurityLayer`].
#[derive(Clone)]
pub struct SecurityService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> Service<Request<Body>> for SecurityService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness; leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = self.shared.clone();

        // Computed before the future so no borrow of the request is held
        // across an await; `Body` is not `Sync`.
        let rate_limit_key = shared.rate_limit_key(&req);

        Box::pin(async move {
            if let Err(rejection) = shared.enforce_rate_limit(rate_limit_key).await {
                return Ok(rejection.into_response());
            }

            let req = if shared.config.validate_input {
                match shared.validate_body(req).await {
                    Ok(req) => req,
                    Err(rejection) => return Ok(rejection.into_response()),
                }
            } else {
                req
            };

            inner.call(req).await
        })
    }
}

impl Shared {
    /// Returns the counter key and route, or `None` when limiting is off.
    fn rate_limit_key(&self, req: &Request<Body>) -> Option<(String, String)> {
        if self.config.rate_limit.is_none() {
            return None;
        }

        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let client = client_identifier(req, self.trust_forwarded_for);
        Some((format!("{client}:{route}"), route))
    }

    async fn enforce_rate_limit(&self, key: Option<(String, String)>) -> Result<(), ApiError> {
        let (Some(limit), Some((key, route))) = (self.config.rate_limit, key) else {
            return Ok(());
        };

        match self.store.check_and_increment(&key, &limit).await {
            Ok(RateLimitDecision::Allowed { .. }) => Ok(()),
            Ok(limited @ RateLimitDecision::Limited { .. }) => {
                let retry_after_secs = limited.retry_after_secs().unwrap_or(1);
                tracing::info!(%route, retry_after_secs, "rate limit exceeded");
                Err(ApiError::RateLimited { retry_after_secs })
            }
            Err(e) => {
                // Limiting never gates privilege; an unavailable counter
                // lets the request through.
                tracing::warn!(
                    error = %e,
                    %route,
                    "rate limit store unavailable, allowing request"
                );
                Ok(())
            }
        }
    }

    async fn validate_body(&self, req: Request<Body>) -> Result<Request<Body>, ApiError> {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| ApiError::validation(format!("unreadable body: {e}")))?;

        (self.validator)(&bytes).map_err(ApiError::validation)?;

        Ok(Request::from_parts(parts, Body::from(bytes)))
    }
}

fn client_identifier(req: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(hop) = first_forwarded_hop(req.headers()) {
            return hop;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

fn first_forwarded_hop(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FORWARDED_FOR)?.to_str().ok()?;
    let hop = value.split(',').next()?.trim();
    (!hop.is_empty()).then(|| hop.to_string())
}
