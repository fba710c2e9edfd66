//! A per-client request-admission gate for HTTP services.
//!
//! Wraps downstream handlers with a token-bucket rate limiter keyed by
//! a trusted client-identity header: one bucket per client in a
//! concurrent visitor registry, plus a background sweeper that evicts
//! idle clients to bound memory growth. Requests over the limit are
//! answered with `429 Too Many Requests`; everything else forwards to
//! the next handler unchanged.

pub mod admission;
pub mod bucket;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod sweeper;
pub mod visitors;

pub use admission::{AdmissionGate, BoxBody};
pub use bucket::TokenBucket;
pub use config::{Config, RateLimitSettings, RuntimeConfig};
pub use error::Error;
pub use sweeper::SweeperHandle;
pub use visitors::VisitorRegistry;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
