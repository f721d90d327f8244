use resocket_core::events::LifecycleEvent;
use std::time::{Duration, Instant};

/// Lifecycle events emitted by a [`ReconnectingSocket`](crate::ReconnectingSocket).
#[derive(Debug, Clone)]
pub enum ReconnectEvent {
    /// A new underlying connection was requested from the factory.
    Connecting {
        socket_name: String,
        timestamp: Instant,
        url: String,
        /// Retries since the last successful open (0 for the first connect).
        retry_count: u32,
    },
    /// The current underlying connection opened.
    Opened {
        socket_name: String,
        timestamp: Instant,
    },
    /// The current underlying connection closed.
    Closed {
        socket_name: String,
        timestamp: Instant,
        /// Close code reported by the transport, if any.
        code: Option<u16>,
        retry_count: u32,
    },
    /// A reconnect attempt was scheduled.
    RetryScheduled {
        socket_name: String,
        timestamp: Instant,
        retry_count: u32,
        delay: Duration,
    },
    /// The factory failed to create a replacement connection.
    ConnectFailed {
        socket_name: String,
        timestamp: Instant,
        error: String,
    },
    /// An attempt did not open within the connection timeout and was abandoned.
    ConnectionTimedOut {
        socket_name: String,
        timestamp: Instant,
        timeout: Duration,
    },
    /// The retry budget is exhausted. No further attempts will be made.
    RetryBudgetExceeded {
        socket_name: String,
        timestamp: Instant,
        attempts: u32,
        max_retries: u32,
    },
}

impl LifecycleEvent for ReconnectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReconnectEvent::Connecting { .. } => "connecting",
            ReconnectEvent::Opened { .. } => "opened",
            ReconnectEvent::Closed { .. } => "closed",
            ReconnectEvent::RetryScheduled { .. } => "retry_scheduled",
            ReconnectEvent::ConnectFailed { .. } => "connect_failed",
            ReconnectEvent::ConnectionTimedOut { .. } => "connection_timed_out",
            ReconnectEvent::RetryBudgetExceeded { .. } => "retry_budget_exceeded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ReconnectEvent::Connecting { timestamp, .. }
            | ReconnectEvent::Opened { timestamp, .. }
            | ReconnectEvent::Closed { timestamp, .. }
            | ReconnectEvent::RetryScheduled { timestamp, .. }
            | ReconnectEvent::ConnectFailed { timestamp, .. }
            | ReconnectEvent::ConnectionTimedOut { timestamp, .. }
            | ReconnectEvent::RetryBudgetExceeded { timestamp, .. } => *timestamp,
        }
    }

    fn socket_name(&self) -> &str {
        match self {
            ReconnectEvent::Connecting { socket_name, .. }
            | ReconnectEvent::Opened { socket_name, .. }
            | ReconnectEvent::Closed { socket_name, .. }
            | ReconnectEvent::RetryScheduled { socket_name, .. }
            | ReconnectEvent::ConnectFailed { socket_name, .. }
            | ReconnectEvent::ConnectionTimedOut { socket_name, .. }
            | ReconnectEvent::RetryBudgetExceeded { socket_name, .. } => socket_name,
        }
    }
}
