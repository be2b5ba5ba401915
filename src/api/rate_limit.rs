//! Per-client request rate limiting.
//!
//! [`RateLimitLayer`] wraps a group of routes with a keyed GCRA limiter from
//! `governor`. Clients are keyed by the peer IP taken from [`ConnectInfo`];
//! requests that carry no connection info share a single key. A rejected
//! request never reaches the wrapped service and answers 429 with the JSON
//! error body and a `Retry-After` header.
//!
//! A quota of `max_requests` per `window` admits a burst of `max_requests`
//! and then refills one request every `window / max_requests`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use governor::clock::{Clock as _, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower::{Layer, Service};

use super::error::ApiErrorResponse;
use crate::infrastructure::ConfigurationError;
use crate::infrastructure::factory::{process_environment, read_number};

/// Requests per client admitted by the global limiter in one window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

/// Global window length (15 minutes).
pub const DEFAULT_WINDOW_SECS: u64 = 15 * 60;

/// Requests per client admitted to `/health` in one window.
pub const DEFAULT_HEALTH_MAX_REQUESTS: u32 = 20;

/// `/health` window length (1 second).
pub const DEFAULT_HEALTH_WINDOW_MS: u64 = 1000;

/// Path the global limiter never counts.
pub const HEALTH_PATH: &str = "/health";

// =============================================================================
// Configuration
// =============================================================================

/// Number of requests a client may send within a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimit {
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }

    fn quota(self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// Limits applied by [`crate::api::build_router`].
///
/// # Environment Variables
///
/// | Variable | Default |
/// |----------|---------|
/// | `RATE_LIMIT_MAX_REQUESTS` | `100` |
/// | `RATE_LIMIT_WINDOW_SECS` | `900` |
/// | `HEALTH_RATE_LIMIT_MAX_REQUESTS` | `20` |
/// | `HEALTH_RATE_LIMIT_WINDOW_MS` | `1000` |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Applied to every route except `/health`.
    pub global: RateLimit,
    /// Applied to `/health` only.
    pub health: RateLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: RateLimit::new(DEFAULT_MAX_REQUESTS, Duration::from_secs(DEFAULT_WINDOW_SECS)),
            health: RateLimit::new(
                DEFAULT_HEALTH_MAX_REQUESTS,
                Duration::from_millis(DEFAULT_HEALTH_WINDOW_MS),
            ),
        }
    }
}

impl RateLimitConfig {
    /// Creates the limits from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a value is not a number or is zero.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(process_environment)
    }

    /// Creates the limits from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`RateLimitConfig::from_env`].
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigurationError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let config = Self {
            global: RateLimit::new(
                read_number(&lookup, "RATE_LIMIT_MAX_REQUESTS", DEFAULT_MAX_REQUESTS)?,
                Duration::from_secs(read_number(&lookup, "RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)?),
            ),
            health: RateLimit::new(
                read_number(&lookup, "HEALTH_RATE_LIMIT_MAX_REQUESTS", DEFAULT_HEALTH_MAX_REQUESTS)?,
                Duration::from_millis(read_number(
                    &lookup,
                    "HEALTH_RATE_LIMIT_WINDOW_MS",
                    DEFAULT_HEALTH_WINDOW_MS,
                )?),
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the limits.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::ZeroLimit` naming the first zero value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let checks = [
            ("RATE_LIMIT_MAX_REQUESTS", self.global.max_requests == 0),
            ("RATE_LIMIT_WINDOW_SECS", self.global.window.is_zero()),
            ("HEALTH_RATE_LIMIT_MAX_REQUESTS", self.health.max_requests == 0),
            ("HEALTH_RATE_LIMIT_WINDOW_MS", self.health.window.is_zero()),
        ];
        match checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((variable, _)) => Err(ConfigurationError::ZeroLimit(variable)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Limiters
// =============================================================================

/// A keyed limiter counting requests per client IP.
pub struct RequestLimiter {
    limit: RateLimit,
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

impl RequestLimiter {
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            limiter: RateLimiter::keyed(limit.quota()),
            clock: DefaultClock::default(),
        }
    }

    /// Counts one request from `client`.
    ///
    /// # Errors
    ///
    /// Returns how long the client has to wait when its quota is used up.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        self.limiter
            .check_key(&client)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    #[must_use]
    pub const fn limit(&self) -> RateLimit {
        self.limit
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RequestLimiter")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

/// The global and `/health` limiters. Clones share their counters.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub global: Arc<RequestLimiter>,
    pub health: Arc<RequestLimiter>,
}

impl RateLimits {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global: Arc::new(RequestLimiter::new(config.global)),
            health: Arc::new(RequestLimiter::new(config.health)),
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

// =============================================================================
// RateLimitLayer
// =============================================================================

/// Tower layer that rejects requests over the limiter's quota.
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RequestLimiter>,
    exempt_path: Option<&'static str>,
}

impl RateLimitLayer {
    #[must_use]
    pub const fn new(limiter: Arc<RequestLimiter>) -> Self {
        Self {
            limiter,
            exempt_path: None,
        }
    }

    /// Lets requests for exactly `path` through uncounted.
    #[must_use]
    pub const fn exempting(mut self, path: &'static str) -> Self {
        self.exempt_path = Some(path);
        self
    }
}

impl<Inner> Layer<Inner> for RateLimitLayer {
    type Service = RateLimitService<Inner>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
            exempt_path: self.exempt_path,
        }
    }
}

// =============================================================================
// RateLimitService
// =============================================================================

#[derive(Debug, Clone)]
pub struct RateLimitService<Inner> {
    inner: Inner,
    limiter: Arc<RequestLimiter>,
    exempt_path: Option<&'static str>,
}

impl<Inner> Service<Request> for RateLimitService<Inner>
where
    Inner: Service<Request, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send,
    Inner::Error: Send + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, context: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(context)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let exempt = self.exempt_path.is_some_and(|path| request.uri().path() == path);
        if !exempt {
            let client = client_address(&request);
            if let Err(wait) = self.limiter.check(client) {
                let response = rate_limited(client, wait);
                return Box::pin(async move { Ok(response) });
            }
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}

fn client_address(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(address)| address.ip())
}

fn rate_limited(client: IpAddr, wait: Duration) -> Response {
    let retry_after = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1);
    tracing::warn!(%client, retry_after, "Rate limit exceeded");

    let mut response =
        ApiErrorResponse::too_many_requests("Too many requests, please try again later").into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

// =============================================================================
// Tests
// =============================================================================
