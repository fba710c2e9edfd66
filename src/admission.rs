//! The admission gate: per-client rate limiting as request middleware.
//!
//! Each inbound request is keyed by a trusted identity header, checked
//! against that identity's token bucket, and either forwarded to the
//! next handler unchanged or answered with `429 Too Many Requests`.
//! Rejection is final for the request; there are no retries inside the
//! gate.
//!
//! A request with no identity header (or a value that is not valid
//! UTF-8) falls into a single shared bucket keyed by the empty string.
//! This is deliberate shared-fate behavior: deployments must ensure the
//! header is set by a trusted proxy layer, or all anonymous traffic
//! throttles as one client.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderName;
use hyper::{Request, Response, StatusCode};
use tracing::warn;

use crate::config::RateLimitSettings;
use crate::sweeper::{self, SweeperHandle};
use crate::visitors::VisitorRegistry;
use crate::{Error, Result};

/// An alias to simplify the calls to `Box<dyn std::error::Error + Send + Sync>`.
type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased response body shared by the gate and its handlers.
///
/// Locally built responses (`Full<Bytes>`) and whatever the next handler
/// produces are erased into the same type, so the pipeline composes
/// regardless of body origin.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, StdError>;

/// Wraps a fixed byte payload into a [`BoxBody`].
pub fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|never| -> StdError { match never {} })
        .boxed()
}

/// Per-client request-admission middleware.
///
/// Owns the visitor registry, the identity header name, and the
/// `active` flag, all fixed at construction. Constructed exactly once
/// per service and shared across every connection task via `Arc`.
#[derive(Debug)]
pub struct AdmissionGate {
    registry: Arc<VisitorRegistry>,
    identity_header: HeaderName,
    active: bool,
    sweep_interval: Duration,
    stale_expiry: Duration,
}

impl AdmissionGate {
    /// Validates the admission parameters and builds the gate with a
    /// fresh, empty registry.
    ///
    /// Fails with [`Error::Config`] on any invalid parameter; no partial
    /// state is constructed on failure.
    pub fn new(settings: &RateLimitSettings, identity_header: HeaderName) -> Result<Self> {
        if !settings.refill_per_second.is_finite() || settings.refill_per_second <= 0.0 {
            return Err(Error::Config(format!(
                "refill_per_second must be a positive number, got {}",
                settings.refill_per_second
            )));
        }
        if settings.burst == 0 {
            return Err(Error::Config("burst must be at least 1".into()));
        }
        if settings.sweep_interval_ms == 0 {
            return Err(Error::Config("sweep_interval_ms must be positive".into()));
        }
        if settings.stale_expiry_ms == 0 {
            return Err(Error::Config("stale_expiry_ms must be positive".into()));
        }

        Ok(Self {
            registry: Arc::new(VisitorRegistry::new(
                settings.refill_per_second,
                settings.burst,
            )),
            identity_header,
            active: settings.active,
            sweep_interval: settings.sweep_interval(),
            stale_expiry: settings.stale_expiry(),
        })
    }

    /// Starts the background sweeper for this gate's registry.
    ///
    /// Returns `None` if a sweeper is already running (see
    /// [`sweeper::spawn`]).
    pub fn start_sweeper(&self) -> Option<SweeperHandle> {
        sweeper::spawn(
            Arc::clone(&self.registry),
            self.sweep_interval,
            self.stale_expiry,
        )
    }

    /// The registry backing this gate, shared with the sweeper.
    pub fn registry(&self) -> &Arc<VisitorRegistry> {
        &self.registry
    }

    /// Gates one request.
    ///
    /// With the gate inactive, forwards unconditionally. Otherwise the
    /// client identity is extracted, its bucket consulted, and the
    /// request either delegated to `next` unchanged or answered with a
    /// plain-text 429 carrying a `Retry-After` hint.
    pub async fn handle<B, F, Fut>(&self, req: Request<B>, next: F) -> Response<BoxBody>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response<BoxBody>>,
    {
        if !self.active {
            return next(req).await;
        }

        let identity = self.identity(&req);
        let bucket = self.registry.get_or_create(&identity);

        let decision = {
            let mut bucket = bucket.lock().unwrap();
            if bucket.allow() {
                Ok(())
            } else {
                Err(bucket.time_until_available())
            }
        };

        match decision {
            Ok(()) => next(req).await,
            Err(retry_after) => {
                warn!(identity = %identity, "rate limit exceeded");
                too_many_requests(retry_after)
            }
        }
    }

    /// Extracts the opaque client identity from the request.
    ///
    /// Missing header or non-UTF-8 value yields the empty string (the
    /// shared anonymous bucket).
    fn identity<B>(&self, req: &Request<B>) -> String {
        req.headers()
            .get(&self.identity_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }
}

/// Builds the plain-text 429 rejection.
fn too_many_requests(retry_after: Duration) -> Response<BoxBody> {
    let retry_secs = (retry_after.as_secs_f64().ceil() as u64).max(1);

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .header(hyper::header::RETRY_AFTER, retry_secs.to_string())
        .body(full("Too Many Requests"))
        .unwrap_or_else(|_| {
            let mut resp = Response::new(full("Too Many Requests"));
            *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            resp
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RateLimitSettings {
        RateLimitSettings {
            refill_per_second: 2.0,
            burst: 3,
            sweep_interval_ms: 1000,
            stale_expiry_ms: 2000,
            active: true,
        }
    }

    fn header() -> HeaderName {
        HeaderName::from_static("x-real-ip")
    }

    #[test]
    fn construction_validates_refill_rate() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = AdmissionGate::new(
                &RateLimitSettings {
                    refill_per_second: bad,
                    ..settings()
                },
                header(),
            )
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }

    #[test]
    fn construction_validates_burst() {
        let err = AdmissionGate::new(
            &RateLimitSettings {
                burst: 0,
                ..settings()
            },
            header(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn construction_validates_sweeper_parameters() {
        for bad in [
            RateLimitSettings {
                sweep_interval_ms: 0,
                ..settings()
            },
            RateLimitSettings {
                stale_expiry_ms: 0,
                ..settings()
            },
        ] {
            assert!(matches!(
                AdmissionGate::new(&bad, header()),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn valid_settings_build_an_empty_registry() {
        let gate = AdmissionGate::new(&settings(), header()).unwrap();
        assert!(gate.registry().is_empty());
    }
}
