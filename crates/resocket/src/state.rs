//! Connection state tracking for the reconnect state machine.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// State of the reconnecting socket as a whole (not of one underlying connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConnectionState {
    /// An underlying connection was created and has not opened or closed yet.
    Connecting,

    /// The current underlying connection is open.
    Open,

    /// The current underlying connection closed; a retry is pending.
    Closed,

    /// The retry budget is exhausted. Terminal.
    Failed,
}

impl ConnectionState {
    /// Returns true for the terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed)
    }
}

/// Shared, cheaply cloneable view of a socket's reconnect bookkeeping.
///
/// Read-only outside the crate; only the socket's state machine moves it.
#[derive(Clone)]
pub struct ReconnectState {
    /// Current state; receivers get notified of every transition
    state: Arc<watch::Sender<ConnectionState>>,

    /// Consecutive closes since the last successful open
    retry_count: Arc<AtomicU32>,

    /// Last computed backoff delay in nanoseconds, 0 until the first close
    current_delay: Arc<AtomicU64>,

    /// Underlying connections created so far
    connections: Arc<AtomicU64>,

    last_opened: Arc<Mutex<Option<Instant>>>,
}

impl ReconnectState {
    /// Create a new reconnect state
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            state: Arc::new(state),
            retry_count: Arc::new(AtomicU32::new(0)),
            current_delay: Arc::new(AtomicU64::new(0)),
            connections: Arc::new(AtomicU64::new(0)),
            last_opened: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    ///
    /// The receiver starts out marked as seen; `changed().await` resolves on
    /// the next transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Set the connection state, returning the previous one
    pub(crate) fn set_state(&self, state: ConnectionState) -> ConnectionState {
        self.state.send_replace(state)
    }

    /// Consecutive closes since the last successful open
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Acquire)
    }

    /// Increment and return the retry count
    pub(crate) fn increment_retries(&self) -> u32 {
        self.retry_count.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    /// Reset the retry count to zero
    pub(crate) fn reset_retries(&self) {
        self.retry_count.store(0, Ordering::Release);
    }

    /// The last backoff delay, zero until the first close after an open
    pub fn current_delay(&self) -> Duration {
        Duration::from_nanos(self.current_delay.load(Ordering::Acquire))
    }

    pub(crate) fn set_current_delay(&self, delay: Duration) {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.current_delay.store(nanos, Ordering::Release);
    }

    /// Number of underlying connections created so far
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Acquire)
    }

    pub(crate) fn record_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark a new attempt as in flight
    pub(crate) fn mark_connecting(&self) -> ConnectionState {
        self.set_state(ConnectionState::Connecting)
    }

    /// Mark the current connection as open; clears retries and backoff
    pub(crate) fn mark_open(&self) -> ConnectionState {
        self.reset_retries();
        self.set_current_delay(Duration::ZERO);
        *self
            .last_opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.set_state(ConnectionState::Open)
    }

    /// Mark the current connection as closed with a retry pending
    pub(crate) fn mark_closed(&self) -> ConnectionState {
        self.set_state(ConnectionState::Closed)
    }

    /// Mark the socket as permanently failed
    pub(crate) fn mark_failed(&self) -> ConnectionState {
        self.set_state(ConnectionState::Failed)
    }

    /// Time since the last successful open
    pub fn time_since_open(&self) -> Option<Duration> {
        self.last_opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|opened| opened.elapsed())
    }
}

impl std::fmt::Debug for ReconnectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectState")
            .field("state", &self.state())
            .field("retry_count", &self.retry_count())
            .field("current_delay", &self.current_delay())
            .field("connections", &self.connections())
            .finish()
    }
}
