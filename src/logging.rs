//! Request logging and panic recovery wrappers.
//!
//! Stateless companions to the admission gate. Each wraps a next handler
//! without touching shared state, so they compose on either side of the
//! gate freely.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use hyper::{Request, Response, StatusCode};
use tracing::{error, info, Instrument};

use crate::admission::{full, BoxBody};

/// Global monotonic counter for assigning unique request IDs.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Logs method and path for the request, then delegates.
///
/// The downstream handler runs inside a span carrying the request id,
/// method, and path, so everything it logs is attributable to the
/// request.
pub async fn log_request<B, F, Fut>(req: Request<B>, next: F) -> Response<BoxBody>
where
    F: FnOnce(Request<B>) -> Fut,
    Fut: Future<Output = Response<BoxBody>>,
{
    let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let span = tracing::info_span!(
        "request",
        id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("received request");
        let resp = next(req).await;
        info!(status = resp.status().as_u16(), "request complete");
        resp
    }
    .instrument(span)
    .await
}

/// Converts a panicking downstream handler into a 500 response.
///
/// The connection task survives, the panic payload is logged, and the
/// client receives `500 Internal Server Error` instead of a reset
/// stream.
pub async fn catch_panic<Fut>(fut: Fut) -> Response<BoxBody>
where
    Fut: Future<Output = Response<BoxBody>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(resp) => resp,
        Err(panic) => {
            error!(panic = panic_message(panic.as_ref()), "handler panicked");
            let mut resp = Response::new(full("Internal Server Error"));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
