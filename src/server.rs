//! Server accept loop, request pipeline, and graceful shutdown.
//!
//! Contains the runtime infrastructure between the TCP listener and the
//! admission gate. This module is intentionally decoupled from `main()`
//! so the server logic remains testable without pulling in process-level
//! concerns like signal handling or `std::process::exit`.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::admission::{full, AdmissionGate, BoxBody};
use crate::logging;
use crate::Result;

/// The downstream handler the gate protects.
///
/// Stands in for the application behind the gate: answers 200 to every
/// admitted request. Swap this out to put real handlers behind the gate.
pub async fn app<B>(_req: Request<B>) -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(full("ok"))
        .unwrap_or_else(|_| Response::new(full("ok")))
}

/// Binds the listener socket.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Accepts connections on `listener` and runs every request through
/// `catch_panic(log_request(gate.handle(..)))` until `shutdown`
/// resolves, then stops accepting new connections and returns.
/// In-flight requests on already-spawned tasks run to completion
/// independently.
pub async fn serve(
    listener: TcpListener,
    gate: Arc<AdmissionGate>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _client_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%e, "failed to accept connection");
                        continue;
                    }
                };

                let gate = Arc::clone(&gate);

                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let gate = Arc::clone(&gate);
                        async move {
                            let resp = logging::catch_panic(logging::log_request(req, {
                                let gate = Arc::clone(&gate);
                                move |req| async move { gate.handle(req, app).await }
                            }))
                            .await;
                            Ok::<Response<BoxBody>, std::convert::Infallible>(resp)
                        }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(%e, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Awaits a shutdown signal (SIGINT or SIGTERM on Unix, Ctrl+C on all
/// platforms). Returns once the first signal is received.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, initiating graceful shutdown");
    }
}
