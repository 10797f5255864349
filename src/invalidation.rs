//! Cache invalidation driven by push messages.
//!
//! The backend announces changes with `data_update`, `log` and
//! `brain_update` messages. [`InvalidationTracker`] turns these into
//! per-domain generation counters so views can tell whether what they
//! fetched earlier is out of date.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use console_link::{ConnectionManager, InvalidationTracker};
//! use console_link::invalidation::DATA;
//!
//! # async fn example() -> console_link::Result<()> {
//! let manager = ConnectionManager::builder().build()?;
//! let tracker = Arc::new(InvalidationTracker::new());
//! tracker.attach(&manager);
//!
//! let seen = tracker.generation(DATA);
//! // ... fetch data ...
//! if tracker.is_stale(DATA, seen) {
//!     // re-fetch
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::identifiers::ListenerId;
use crate::manager::ConnectionManager;
use crate::protocol::InboundMessage;

// ============================================================================
// Constants
// ============================================================================

/// Domain bumped by `data_update`.
pub const DATA: &str = "data";

/// Domain bumped by `log`.
pub const LOGS: &str = "logs";

/// Domain bumped by `brain_update`.
pub const BRAIN: &str = "brain";

// ============================================================================
// InvalidationTracker
// ============================================================================

/// Per-domain generation counters.
///
/// Every domain starts at generation 0 and only moves forward.
#[derive(Debug, Default)]
pub struct InvalidationTracker {
    generations: RwLock<FxHashMap<String, u64>>,
}

impl InvalidationTracker {
    /// Creates a tracker with every domain at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `domain` as changed and returns its new generation.
    pub fn record(&self, domain: &str) -> u64 {
        let mut generations = self.generations.write();
        let generation = generations.entry(domain.to_string()).or_insert(0);
        *generation += 1;
        trace!(domain, generation = *generation, "Domain invalidated");
        *generation
    }

    /// Records the domain `message` belongs to, if any.
    ///
    /// Returns the new generation, or `None` for message types without a
    /// domain.
    pub fn observe(&self, message: &InboundMessage) -> Option<u64> {
        message.kind().domain().map(|domain| self.record(domain))
    }

    /// Returns the current generation of `domain`.
    #[inline]
    #[must_use]
    pub fn generation(&self, domain: &str) -> u64 {
        self.generations.read().get(domain).copied().unwrap_or(0)
    }

    /// Returns `true` if `domain` changed since generation `seen`.
    #[inline]
    #[must_use]
    pub fn is_stale(&self, domain: &str, seen: u64) -> bool {
        self.generation(domain) != seen
    }

    /// Returns every domain that has changed at least once.
    #[must_use]
    pub fn snapshot(&self) -> FxHashMap<String, u64> {
        self.generations.read().clone()
    }

    /// Feeds every message `manager` receives into this tracker.
    ///
    /// Remove the registration with
    /// [`ConnectionManager::remove_listener`] to detach.
    pub fn attach(self: &Arc<Self>, manager: &ConnectionManager) -> ListenerId {
        let tracker = Arc::clone(self);
        manager.on_any_message(move |message| {
            tracker.observe(message);
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
