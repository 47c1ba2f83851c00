//! Subscription Tracking
//!
//! Tracks the caller's declared interest in instruments. The set must
//! survive reconnects: the transport re-issues it on every successful
//! connection, so subscribe/unsubscribe calls made while disconnected
//! still take effect on the next connect.
//!
//! The request-id counter lives here too because outbound control
//! frames carry a monotonically increasing id per session.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::domain::book::InstrumentId;

/// Thread-safe instrument subscription set plus request-id counter.
///
/// Mutations by the caller and reads by the reconnect handler go
/// through the same lock, so resubscription never sees a half-updated
/// list.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    instruments: RwLock<BTreeSet<InstrumentId>>,
    next_request_id: AtomicU64,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(BTreeSet::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Add an instrument. Returns `true` if it was not already present.
    pub fn add(&self, instrument: impl Into<InstrumentId>) -> bool {
        self.instruments.write().insert(instrument.into())
    }

    /// Remove an instrument. Returns `true` if it was present.
    pub fn remove(&self, instrument: &str) -> bool {
        self.instruments.write().remove(instrument)
    }

    /// Whether an instrument is currently subscribed.
    #[must_use]
    pub fn contains(&self, instrument: &str) -> bool {
        self.instruments.read().contains(instrument)
    }

    /// Consistent point-in-time copy of the set, in stable order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<InstrumentId> {
        self.instruments.read().iter().cloned().collect()
    }

    /// Number of subscribed instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    /// Next outbound request id. Monotonically increasing.
    #[must_use]
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}
