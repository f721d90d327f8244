//! The reconnecting socket and its state machine.
//!
//! A [`ReconnectingSocket`] owns exactly one underlying connection at a time.
//! When that connection closes, the socket waits out a backoff delay, asks the
//! factory for a replacement, reinstalls its own open/close handlers on it and
//! replays every caller subscription onto it.
//!
//! All transitions run under one lock. Each underlying connection gets a
//! generation number; events from any connection other than the current one,
//! and repeated close events from the current one, are ignored.

use crate::config::ReconnectConfig;
use crate::error::ReconnectError;
use crate::events::ReconnectEvent;
use crate::registry::{self, ListenerRegistry};
use crate::state::{ConnectionState, ReconnectState};
use crate::timer::{Scheduler, TimerHandle, TokioScheduler};
use resocket_core::{
    Event, Listener, ListenerOptions, ReadyState, SharedTransport, TransportFactory, listener,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::watch;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

/// Logs at debug level when the socket was configured with `debug(true)`.
macro_rules! debug_log {
    ($config:expr, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        if $config.debug {
            tracing::debug!(socket = %$config.name, $($arg)+);
        }
    };
}

/// A socket that transparently replaces its underlying connection whenever it
/// closes.
///
/// Callers talk to it through [`Transport`](resocket_core::Transport) exactly
/// as they would talk to a single connection. Subscriptions made through it
/// survive reconnects; subscriptions made directly on an underlying connection
/// do not.
///
/// Dropping the socket cancels any pending retry and closes the current
/// connection with code 1000.
pub struct ReconnectingSocket {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    protocols: Vec<String>,
    config: ReconnectConfig,
    factory: TransportFactory,
    scheduler: Arc<dyn Scheduler>,
    state: ReconnectState,
    inner: Mutex<Inner>,
}

struct Inner {
    current: SharedTransport,
    generation: u64,
    current_opened: bool,
    current_closed: bool,
    registry: ListenerRegistry,
    pending_retry: Option<PendingTimer>,
    pending_timeout: Option<PendingTimer>,
    next_timer_id: u64,
    failure: Option<ReconnectError>,
    shut_down: bool,
}

struct PendingTimer {
    id: u64,
    handle: TimerHandle,
}

impl Inner {
    fn take_timer_id(&mut self) -> u64 {
        self.next_timer_id += 1;
        self.next_timer_id
    }

    fn cancel_timers(&mut self) {
        if let Some(pending) = self.pending_retry.take() {
            pending.handle.cancel();
        }
        if let Some(pending) = self.pending_timeout.take() {
            pending.handle.cancel();
        }
    }
}

impl ReconnectingSocket {
    /// Creates a socket for `url` with no subprotocols and starts the first
    /// connection.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, if no factory is available, if
    /// no scheduler is configured and no tokio runtime is running, or if the
    /// factory rejects the first connection.
    pub fn connect(url: impl Into<String>, config: ReconnectConfig) -> Result<Self, ReconnectError> {
        Self::connect_with_protocols(url, Vec::<String>::new(), config)
    }

    /// Creates a socket for `url` offering `protocols`, and starts the first
    /// connection.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use resocket::testing::MockFactory;
    /// use resocket::{ConnectionState, ReconnectConfig, ReconnectingSocket};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), resocket::ReconnectError> {
    /// let factory = MockFactory::new();
    /// let config = ReconnectConfig::builder()
    ///     .shared_factory(factory.factory())
    ///     .build();
    ///
    /// let socket = ReconnectingSocket::connect_with_protocols("ws://localhost/feed", ["v2"], config)?;
    /// assert_eq!(socket.connection_state(), ConnectionState::Connecting);
    /// assert_eq!(factory.last().unwrap().protocols(), ["v2".to_string()]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn connect_with_protocols<P, S>(
        url: impl Into<String>,
        protocols: P,
        config: ReconnectConfig,
    ) -> Result<Self, ReconnectError>
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.validate()?;
        let factory = config.resolve_factory()?;
        let scheduler: Arc<dyn Scheduler> = match &config.scheduler {
            Some(scheduler) => Arc::clone(scheduler),
            None => Arc::new(TokioScheduler::try_current().ok_or(ReconnectError::NoRuntime)?),
        };
        let url = url.into();
        let protocols: Vec<String> = protocols.into_iter().map(Into::into).collect();

        #[cfg(feature = "metrics")]
        describe_metrics();

        debug_log!(config, url = %url, "init");
        let state = ReconnectState::new();
        state.record_connection();
        config.observers.emit(&ReconnectEvent::Connecting {
            socket_name: config.name.clone(),
            timestamp: Instant::now(),
            url: url.clone(),
            retry_count: 0,
        });
        #[cfg(feature = "metrics")]
        counter!("resocket_connect_attempts_total", "socket" => config.name.clone()).increment(1);

        let transport = factory(&url, &protocols)?;

        let shared = Arc::new(Shared {
            url,
            protocols,
            config,
            factory,
            scheduler,
            state,
            inner: Mutex::new(Inner {
                current: Arc::clone(&transport),
                generation: 1,
                current_opened: false,
                current_closed: false,
                registry: ListenerRegistry::new(),
                pending_retry: None,
                pending_timeout: None,
                next_timer_id: 0,
                failure: None,
                shut_down: false,
            }),
        });
        shared.publish_state(ConnectionState::Connecting);
        shared.install_handlers(&transport, 1);
        shared.settle(&transport, 1);

        Ok(Self { shared })
    }

    /// The address every underlying connection is created for.
    pub fn target_url(&self) -> &str {
        &self.shared.url
    }

    /// The subprotocols offered on every connect.
    pub fn protocols(&self) -> &[String] {
        &self.shared.protocols
    }

    /// The configuration this socket was built with.
    pub fn config(&self) -> &ReconnectConfig {
        &self.shared.config
    }

    /// Reconnect bookkeeping: retry count, current delay, connection count.
    pub fn state(&self) -> &ReconnectState {
        &self.shared.state
    }

    /// The state of the socket as a whole.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.state()
    }

    /// Watch the socket's state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive closes since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.shared.state.retry_count()
    }

    /// The error that ended reconnection, once the retry budget is exhausted.
    pub fn failure(&self) -> Option<ReconnectError> {
        self.shared.lock().failure.clone()
    }

    /// Subscribes `listener` to events of type `kind`.
    ///
    /// The subscription is recorded so it can be replayed onto every future
    /// underlying connection, then applied to the current one. Subscribing the
    /// same listener to the same type twice records it once.
    pub fn subscribe(&self, kind: &str, listener: Listener, options: ListenerOptions) {
        let current = {
            let mut inner = self.shared.lock();
            inner.registry.record(kind, Arc::clone(&listener), options);
            Arc::clone(&inner.current)
        };
        current.add_event_listener(kind, listener, options);
    }

    /// Removes a subscription from the record and from the current connection.
    ///
    /// Removing a listener that was never subscribed is a no-op.
    pub fn unsubscribe(&self, kind: &str, listener: &Listener, options: ListenerOptions) {
        let current = {
            let mut inner = self.shared.lock();
            inner.registry.forget(kind, listener);
            Arc::clone(&inner.current)
        };
        current.remove_event_listener(kind, listener, options);
    }

    /// Number of recorded subscriptions for `kind`.
    pub fn subscription_count(&self, kind: &str) -> usize {
        self.shared.lock().registry.count(kind)
    }

    /// The current underlying connection.
    pub(crate) fn current(&self) -> SharedTransport {
        Arc::clone(&self.shared.lock().current)
    }
}

impl Drop for ReconnectingSocket {
    fn drop(&mut self) {
        let current = {
            let mut inner = self.shared.lock();
            inner.shut_down = true;
            inner.cancel_timers();
            Arc::clone(&inner.current)
        };
        if matches!(current.ready_state(), ReadyState::Connecting | ReadyState::Open) {
            let _ = current.close(Some(1000), None);
        }
    }
}

impl std::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.shared.url)
            .field("name", &self.shared.config.name)
            .field("state", &self.shared.state)
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: Vec<ReconnectEvent>) {
        for event in &events {
            self.config.observers.emit(event);
        }
    }

    fn publish_state(&self, _state: ConnectionState) {
        #[cfg(feature = "metrics")]
        gauge!("resocket_state", "socket" => self.config.name.clone()).set(match _state {
            ConnectionState::Connecting => 0.0,
            ConnectionState::Open => 1.0,
            ConnectionState::Closed => 2.0,
            ConnectionState::Failed => 3.0,
        });
    }

    /// Installs the internal open/close handlers on a connection of `generation`.
    fn install_handlers(self: &Arc<Self>, transport: &SharedTransport, generation: u64) {
        let weak: Weak<Shared> = Arc::downgrade(self);
        transport.add_event_listener(
            Event::OPEN,
            listener(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_open(generation);
                }
            }),
            ListenerOptions::default(),
        );

        let weak: Weak<Shared> = Arc::downgrade(self);
        transport.add_event_listener(
            Event::CLOSE,
            listener(move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_close(generation, event.close_info().map(|info| info.code));
                }
            }),
            ListenerOptions::default(),
        );
    }

    /// Catches up on any transition the connection made before its handlers
    /// were in place, then arms the connection timeout if enforced.
    fn settle(self: &Arc<Self>, transport: &SharedTransport, generation: u64) {
        match transport.ready_state() {
            ReadyState::Open => self.handle_open(generation),
            ReadyState::Closed => self.handle_close(generation, None),
            ReadyState::Connecting | ReadyState::Closing => {}
        }

        if self.config.enforce_connection_timeout {
            self.arm_connection_timeout(generation);
        }
    }

    fn handle_open(&self, generation: u64) {
        {
            let mut inner = self.lock();
            if inner.shut_down
                || inner.generation != generation
                || inner.current_opened
                || inner.current_closed
            {
                return;
            }
            inner.current_opened = true;
            inner.cancel_timers();
            self.state.mark_open();
        }
        self.publish_state(ConnectionState::Open);
        debug_log!(self.config, "open");

        self.emit(vec![ReconnectEvent::Opened {
            socket_name: self.config.name.clone(),
            timestamp: Instant::now(),
        }]);
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let mut events = Vec::new();
        {
            let mut inner = self.lock();
            if inner.shut_down || inner.generation != generation || inner.current_closed {
                return;
            }
            inner.current_closed = true;
            if let Some(pending) = inner.pending_timeout.take() {
                pending.handle.cancel();
            }

            let retry_count = self.state.increment_retries();
            debug_log!(self.config, code = ?code, retry_count, "close");
            events.push(ReconnectEvent::Closed {
                socket_name: self.config.name.clone(),
                timestamp: Instant::now(),
                code,
                retry_count,
            });
            self.schedule_retry(&mut inner, retry_count, &mut events);
        }
        self.emit(events);
    }

    /// Schedules the next attempt, or moves to `Failed` once the retry budget
    /// is spent. Runs under the lock.
    fn schedule_retry(
        self: &Arc<Self>,
        inner: &mut Inner,
        retry_count: u32,
        events: &mut Vec<ReconnectEvent>,
    ) {
        if let Some(max_retries) = self.config.max_retries {
            if retry_count > max_retries {
                self.state.mark_failed();
                self.publish_state(ConnectionState::Failed);
                inner.failure = Some(ReconnectError::RetryBudgetExceeded {
                    attempts: retry_count,
                    max_retries,
                });

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    socket = %self.config.name,
                    attempts = retry_count,
                    max_retries,
                    "giving up on reconnecting, retry budget exhausted"
                );
                #[cfg(feature = "metrics")]
                counter!("resocket_retry_budget_exceeded_total", "socket" => self.config.name.clone())
                    .increment(1);

                events.push(ReconnectEvent::RetryBudgetExceeded {
                    socket_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    attempts: retry_count,
                    max_retries,
                });
                return;
            }
        }

        let policy = &self.config.policy;
        let previous = self.state.current_delay();
        let delay = if previous.is_zero() {
            policy.initial_delay()
        } else {
            policy.next_delay(previous)
        };
        self.state.set_current_delay(delay);
        self.state.mark_closed();
        self.publish_state(ConnectionState::Closed);

        let id = inner.take_timer_id();
        let weak: Weak<Shared> = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_retry_timer(id);
                }
            }),
        );
        inner.pending_retry = Some(PendingTimer { id, handle });

        debug_log!(self.config, retry_count, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        #[cfg(feature = "metrics")]
        counter!("resocket_retries_scheduled_total", "socket" => self.config.name.clone()).increment(1);

        events.push(ReconnectEvent::RetryScheduled {
            socket_name: self.config.name.clone(),
            timestamp: Instant::now(),
            retry_count,
            delay,
        });
    }

    fn handle_retry_timer(self: &Arc<Self>, id: u64) {
        let retry_count = {
            let mut inner = self.lock();
            match &inner.pending_retry {
                Some(pending) if pending.id == id => {}
                _ => return,
            }
            inner.pending_retry = None;
            if inner.shut_down {
                return;
            }
            self.state.mark_connecting();
            self.state.record_connection();
            self.state.retry_count()
        };
        self.publish_state(ConnectionState::Connecting);
        self.reconnect(retry_count);
    }

    fn reconnect(self: &Arc<Self>, retry_count: u32) {
        debug_log!(self.config, retry_count, "connect");
        #[cfg(feature = "metrics")]
        counter!("resocket_connect_attempts_total", "socket" => self.config.name.clone()).increment(1);
        self.emit(vec![ReconnectEvent::Connecting {
            socket_name: self.config.name.clone(),
            timestamp: Instant::now(),
            url: self.url.clone(),
            retry_count,
        }]);

        match (self.factory)(&self.url, &self.protocols) {
            Ok(transport) => {
                let (generation, replay) = {
                    let mut inner = self.lock();
                    if inner.shut_down {
                        drop(inner);
                        let _ = transport.close(Some(1000), None);
                        return;
                    }
                    inner.generation += 1;
                    inner.current = Arc::clone(&transport);
                    inner.current_opened = false;
                    inner.current_closed = false;
                    (inner.generation, inner.registry.snapshot())
                };
                self.install_handlers(&transport, generation);
                registry::replay(&replay, transport.as_ref());
                // An unsubscribe that ran during the replay could not detach
                // what had not been attached yet.
                let forgotten = self.lock().registry.forgotten_since(&replay);
                registry::detach(&forgotten, transport.as_ref());
                self.settle(&transport, generation);
            }
            Err(error) => {
                let mut events = vec![ReconnectEvent::ConnectFailed {
                    socket_name: self.config.name.clone(),
                    timestamp: Instant::now(),
                    error: error.to_string(),
                }];
                {
                    let mut inner = self.lock();
                    if inner.shut_down {
                        return;
                    }
                    debug_log!(self.config, error = %error, "connect failed");
                    let retry_count = self.state.increment_retries();
                    self.schedule_retry(&mut inner, retry_count, &mut events);
                }
                self.emit(events);
            }
        }
    }

    fn arm_connection_timeout(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.shut_down
            || inner.generation != generation
            || inner.current_opened
            || inner.current_closed
        {
            return;
        }
        let id = inner.take_timer_id();
        let weak: Weak<Shared> = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            self.config.connection_timeout,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_connection_timeout(id, generation);
                }
            }),
        );
        inner.pending_timeout = Some(PendingTimer { id, handle });
    }

    fn handle_connection_timeout(self: &Arc<Self>, id: u64, generation: u64) {
        let transport = {
            let mut inner = self.lock();
            match &inner.pending_timeout {
                Some(pending) if pending.id == id => {}
                _ => return,
            }
            inner.pending_timeout = None;
            if inner.shut_down
                || inner.generation != generation
                || inner.current_opened
                || inner.current_closed
            {
                return;
            }
            Arc::clone(&inner.current)
        };

        debug_log!(self.config, "connection timeout");
        self.emit(vec![ReconnectEvent::ConnectionTimedOut {
            socket_name: self.config.name.clone(),
            timestamp: Instant::now(),
            timeout: self.config.connection_timeout,
        }]);

        let _ = transport.close(Some(4000), Some("connection timeout"));
        // A transport that reports its close synchronously has already been
        // handled; this is then a no-op.
        self.handle_close(generation, None);
    }
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "resocket_connect_attempts_total",
            "Total number of underlying connections requested"
        );
        describe_counter!(
            "resocket_retries_scheduled_total",
            "Total number of reconnect attempts scheduled"
        );
        describe_counter!(
            "resocket_retry_budget_exceeded_total",
            "Total number of sockets that gave up reconnecting"
        );
        describe_gauge!(
            "resocket_state",
            "Current socket state (0=connecting, 1=open, 2=closed, 3=failed)"
        );
    });
}
