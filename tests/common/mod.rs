//! Shared test infrastructure for integration tests.
//!
//! Provides gate builders, request constructors, and body collectors
//! used across the integration test modules.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::HeaderName;
use hyper::{Method, Request, Response, StatusCode};
use turnstile::admission::full;
use turnstile::{AdmissionGate, BoxBody, RateLimitSettings};

/// Initializes a tracing subscriber for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// Admission parameters for the end-to-end scenario: 2 tokens/s
/// sustained, burst of 3.
pub fn default_settings() -> RateLimitSettings {
    RateLimitSettings {
        refill_per_second: 2.0,
        burst: 3,
        sweep_interval_ms: 60_000,
        stale_expiry_ms: 180_000,
        active: true,
    }
}

/// Builds a gate with the given settings, keyed by `x-real-ip`.
pub fn gate(settings: RateLimitSettings) -> AdmissionGate {
    AdmissionGate::new(&settings, HeaderName::from_static("x-real-ip"))
        .expect("test settings must be valid")
}

/// Builds a GET request carrying the given client identity.
pub fn request_from(identity: &str) -> Request<Empty<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri("http://gateway.test/")
        .header("x-real-ip", identity)
        .body(Empty::new())
        .expect("test request must build")
}

/// Builds a GET request with no identity header at all.
pub fn anonymous_request() -> Request<Empty<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri("http://gateway.test/")
        .body(Empty::new())
        .expect("test request must build")
}

/// The next handler used in tests: answers 200 `ok` to every admitted
/// request.
pub async fn ok_handler(_req: Request<Empty<Bytes>>) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .body(full("ok"))
        .expect("test response must build")
}

/// Collects a [`BoxBody`] into [`Bytes`], mapping any body error to a
/// descriptive panic so test assertions remain concise.
pub async fn collect_body(body: BoxBody) -> Bytes {
    body.collect()
        .await
        .expect("failed to collect response body")
        .to_bytes()
}
