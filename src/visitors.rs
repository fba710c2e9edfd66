//! Concurrent visitor registry: one token bucket per client identity.
//!
//! The registry is the only shared mutable state on the admission path.
//! A single `RwLock` guards the identity map; each entry's bucket sits
//! behind its own `Mutex`, so admission checks for one identity are
//! serialized while checks for different identities only contend for
//! the duration of the map lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::bucket::TokenBucket;

/// Shared handle to one client's token bucket.
pub type BucketHandle = Arc<Mutex<TokenBucket>>;

/// A registered visitor: its bucket and the time it was last looked up.
#[derive(Debug)]
struct VisitorEntry {
    bucket: BucketHandle,
    last_seen: Instant,
}

/// Mapping from client identity to visitor state.
///
/// Owned by the admission gate, constructed exactly once for the life of
/// the service, and shared with the sweeper. Keys are opaque strings
/// compared byte-exactly; the registry performs no normalization.
#[derive(Debug)]
pub struct VisitorRegistry {
    visitors: RwLock<HashMap<String, VisitorEntry>>,
    refill_per_second: f64,
    capacity: u32,
    /// Set while a sweeper task owns this registry.
    sweeper_running: AtomicBool,
}

impl VisitorRegistry {
    /// Creates an empty registry whose buckets are built with the given
    /// rate and capacity.
    ///
    /// Inputs are assumed validated by the caller
    /// ([`crate::AdmissionGate::new`]).
    pub fn new(refill_per_second: f64, capacity: u32) -> Self {
        Self {
            visitors: RwLock::new(HashMap::new()),
            refill_per_second,
            capacity,
            sweeper_running: AtomicBool::new(false),
        }
    }

    /// Returns the bucket for `identity`, creating it on first sight.
    ///
    /// A hit updates the entry's `last_seen`; a miss inserts a fresh,
    /// full bucket. Both paths run under the write lock, so concurrent
    /// first-seen requests for the same identity always converge on a
    /// single bucket.
    pub fn get_or_create(&self, identity: &str) -> BucketHandle {
        let now = Instant::now();
        let mut visitors = self.visitors.write().unwrap();

        if let Some(entry) = visitors.get_mut(identity) {
            entry.last_seen = now;
            return Arc::clone(&entry.bucket);
        }

        debug!(identity, "registering new visitor");
        let bucket = Arc::new(Mutex::new(TokenBucket::new(
            self.refill_per_second,
            self.capacity,
        )));
        visitors.insert(
            identity.to_owned(),
            VisitorEntry {
                bucket: Arc::clone(&bucket),
                last_seen: now,
            },
        );
        bucket
    }

    /// Removes `identity` if present. Evicting an absent identity is a
    /// no-op.
    pub fn evict(&self, identity: &str) {
        self.visitors.write().unwrap().remove(identity);
    }

    /// Copies out every `(identity, last_seen)` pair.
    pub fn snapshot(&self) -> Vec<(String, Instant)> {
        self.visitors
            .read()
            .unwrap()
            .iter()
            .map(|(identity, entry)| (identity.clone(), entry.last_seen))
            .collect()
    }

    /// Removes every visitor idle longer than `expiry` in one exclusive
    /// pass, returning how many were dropped.
    pub fn remove_stale(&self, expiry: Duration) -> usize {
        let now = Instant::now();
        let mut visitors = self.visitors.write().unwrap();
        let before = visitors.len();
        visitors.retain(|_, entry| now.duration_since(entry.last_seen) <= expiry);
        before - visitors.len()
    }

    /// Number of currently tracked identities.
    pub fn len(&self) -> usize {
        self.visitors.read().unwrap().len()
    }

    /// Returns `true` if no identities are tracked.
    pub fn is_empty(&self) -> bool {
        self.visitors.read().unwrap().is_empty()
    }

    /// Claims the registry's sweeper slot.
    ///
    /// Returns `false` if a sweeper already owns it.
    pub(crate) fn claim_sweeper(&self) -> bool {
        !self.sweeper_running.swap(true, Ordering::SeqCst)
    }

    /// Releases the sweeper slot when the owning task exits.
    pub(crate) fn release_sweeper(&self) {
        self.sweeper_running.store(false, Ordering::SeqCst);
    }
}
