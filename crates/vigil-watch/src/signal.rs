//! One-shot cancellation signals for watch tasks.
//!
//! Each attach loop observes exactly one signal. Triggering is sync and
//! idempotent; a trigger that races ahead of the observer is latched, so
//! a loop that subscribes late still wakes immediately.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a cancellation signal, used for handle
/// bookkeeping and reported back to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    /// Returns the raw numeric identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A one-shot, poll-observable wakeup used to ask a running watch task
/// to stop.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    id: SignalId,
    notify: Arc<Notify>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    /// Creates a fresh, untriggered signal with a new identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: SignalId(NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Returns this signal's identifier.
    #[must_use]
    pub const fn id(&self) -> SignalId {
        self.id
    }

    /// Requests cancellation. Callable from sync context; latched if the
    /// observer is not yet waiting.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Suspends until cancellation has been requested.
    pub async fn cancelled(&self) {
        self.notify.notified().await;
    }
}
