//! In-memory transports and a hand-driven scheduler.
//!
//! These make the reconnect state machine deterministic: the test decides when
//! a connection opens or closes and when a retry timer fires.
//!
//! # Examples
//!
//! ```rust,ignore
//! use resocket::testing::{ManualScheduler, MockFactory};
//! use resocket::{ConnectionState, ReconnectConfig, ReconnectingSocket};
//!
//! let factory = MockFactory::new();
//! let scheduler = ManualScheduler::new();
//! let config = ReconnectConfig::builder()
//!     .shared_factory(factory.factory())
//!     .scheduler(scheduler.clone())
//!     .build();
//! let socket = ReconnectingSocket::connect("ws://test", config)?;
//!
//! factory.last().unwrap().fire_close(1006);
//! assert_eq!(socket.connection_state(), ConnectionState::Closed);
//!
//! scheduler.fire_next();
//! assert_eq!(factory.created(), 2);
//! ```

use crate::timer::{Scheduler, Task, TimerHandle};
use resocket_core::{
    BinaryType, Event, HandlerSlot, HandlerSlots, Listener, ListenerOptions, ListenerSet, Payload,
    ReadyState, SharedTransport, Transport, TransportError, TransportFactory, dispatch,
    validate_close_code,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A transport whose lifecycle is driven by the test.
///
/// Events fired through `fire_*` are delivered synchronously, on the calling
/// thread. Closing it with [`Transport::close`] reports the close immediately.
pub struct MockTransport {
    url: String,
    protocols: Vec<String>,
    ready_state: AtomicU8,
    binary_type: Mutex<BinaryType>,
    protocol: Mutex<String>,
    extensions: Mutex<String>,
    listeners: Mutex<ListenerSet>,
    handlers: Mutex<HandlerSlots>,
    sent: Mutex<Vec<Payload>>,
    close_calls: Mutex<Vec<Option<u16>>>,
}

impl MockTransport {
    /// Creates a transport in the `Connecting` state.
    pub fn new(url: impl Into<String>, protocols: &[String]) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            protocols: protocols.to_vec(),
            ready_state: AtomicU8::new(ReadyState::Connecting.as_u8()),
            binary_type: Mutex::new(BinaryType::default()),
            protocol: Mutex::new(String::new()),
            extensions: Mutex::new(String::new()),
            listeners: Mutex::new(ListenerSet::new()),
            handlers: Mutex::new(HandlerSlots::default()),
            sent: Mutex::new(Vec::new()),
            close_calls: Mutex::new(Vec::new()),
        })
    }

    /// The subprotocols this transport was created with.
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// Every payload accepted by `send`, in order.
    pub fn sent(&self) -> Vec<Payload> {
        lock(&self.sent).clone()
    }

    /// The code of every effective `close` call, in order.
    pub fn close_calls(&self) -> Vec<Option<u16>> {
        lock(&self.close_calls).clone()
    }

    /// Sets the negotiated subprotocol.
    pub fn set_protocol(&self, protocol: impl Into<String>) {
        *lock(&self.protocol) = protocol.into();
    }

    /// Sets the negotiated extensions.
    pub fn set_extensions(&self, extensions: impl Into<String>) {
        *lock(&self.extensions) = extensions.into();
    }

    /// Returns true if `listener` is registered for `kind`.
    pub fn has_listener(&self, kind: &str, listener: &Listener) -> bool {
        lock(&self.listeners).contains(kind, listener)
    }

    /// Number of listeners registered for `kind`, internal ones included.
    pub fn listener_count(&self, kind: &str) -> usize {
        lock(&self.listeners).count(kind)
    }

    /// Moves to `Open` and fires an open event.
    pub fn fire_open(&self) {
        self.set_ready_state(ReadyState::Open);
        self.dispatch_event(Event::open());
    }

    /// Fires a message event, honouring the binary type.
    pub fn fire_message(&self, payload: impl Into<Payload>) {
        let payload = match (payload.into(), self.binary_type()) {
            (Payload::Binary(bytes), BinaryType::Utf8Lossy) => {
                Payload::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            (payload, _) => payload,
        };
        self.dispatch_event(Event::message(payload));
    }

    /// Fires an error event.
    pub fn fire_error(&self, description: impl Into<String>) {
        self.dispatch_event(Event::error(description));
    }

    /// Moves to `Closed` and fires a close event with `code`.
    pub fn fire_close(&self, code: u16) {
        self.set_ready_state(ReadyState::Closed);
        self.dispatch_event(Event::close(code, "", code == 1000));
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state.as_u8(), Ordering::Release);
    }
}

impl Transport for MockTransport {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::Acquire))
    }

    fn buffered_amount(&self) -> usize {
        0
    }

    fn extensions(&self) -> String {
        lock(&self.extensions).clone()
    }

    fn protocol(&self) -> String {
        lock(&self.protocol).clone()
    }

    fn binary_type(&self) -> BinaryType {
        *lock(&self.binary_type)
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *lock(&self.binary_type) = binary_type;
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        match self.ready_state() {
            ReadyState::Open => {
                lock(&self.sent).push(payload);
                Ok(())
            }
            state => Err(TransportError::NotOpen(state)),
        }
    }

    fn close(&self, code: Option<u16>, _reason: Option<&str>) -> Result<(), TransportError> {
        validate_close_code(code)?;
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return Ok(());
        }
        lock(&self.close_calls).push(code);
        // 1005: no status code was present.
        self.fire_close(code.unwrap_or(1005));
        Ok(())
    }

    fn dispatch_event(&self, event: Event) -> bool {
        let mut listeners = lock(&self.listeners).take_for_dispatch(event.kind());
        if let Some(handler) = lock(&self.handlers).for_event(event.kind()) {
            listeners.push(handler);
        }
        dispatch(&listeners, &event);
        true
    }

    fn add_event_listener(&self, kind: &str, listener: Listener, options: ListenerOptions) {
        lock(&self.listeners).add(kind, listener, options);
    }

    fn remove_event_listener(&self, kind: &str, listener: &Listener, options: ListenerOptions) {
        lock(&self.listeners).remove(kind, listener, options);
    }

    fn handler(&self, slot: HandlerSlot) -> Option<Listener> {
        lock(&self.handlers).get(slot)
    }

    fn set_handler(&self, slot: HandlerSlot, handler: Option<Listener>) {
        lock(&self.handlers).set(slot, handler);
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("url", &self.url)
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

#[derive(Default)]
struct FactoryState {
    created: Vec<Arc<MockTransport>>,
    calls: usize,
    failures_remaining: usize,
    open_immediately: bool,
}

/// Produces [`MockTransport`]s and keeps a handle to each one.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the factory to hand to
    /// [`ReconnectConfigBuilder::shared_factory`](crate::ReconnectConfigBuilder::shared_factory).
    pub fn factory(&self) -> TransportFactory {
        let state = Arc::clone(&self.state);
        Arc::new(move |url: &str, protocols: &[String]| {
            let mut state = lock(&state);
            state.calls += 1;
            if state.failures_remaining > 0 {
                state.failures_remaining -= 1;
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            let transport = MockTransport::new(url, protocols);
            if state.open_immediately {
                transport.set_ready_state(ReadyState::Open);
            }
            state.created.push(Arc::clone(&transport));
            Ok(transport as SharedTransport)
        })
    }

    /// Makes the next `count` calls fail.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).failures_remaining = count;
    }

    /// Hands out transports that are already open, without firing an event.
    pub fn open_immediately(&self, open: bool) {
        lock(&self.state).open_immediately = open;
    }

    /// Number of transports created.
    pub fn created(&self) -> usize {
        lock(&self.state).created.len()
    }

    /// Number of calls, failed ones included.
    pub fn calls(&self) -> usize {
        lock(&self.state).calls
    }

    /// The `index`th transport created.
    pub fn get(&self, index: usize) -> Option<Arc<MockTransport>> {
        lock(&self.state).created.get(index).cloned()
    }

    /// The most recently created transport.
    pub fn last(&self) -> Option<Arc<MockTransport>> {
        lock(&self.state).created.last().cloned()
    }
}

impl std::fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockFactory")
            .field("created", &state.created.len())
            .field("calls", &state.calls)
            .finish()
    }
}

struct PendingTask {
    id: u64,
    delay: Duration,
    task: Task,
}

#[derive(Default)]
struct SchedulerState {
    next_id: u64,
    pending: Vec<PendingTask>,
    history: Vec<Duration>,
}

/// A scheduler whose timers only fire when the test says so.
///
/// Tasks fire in the order they were scheduled, whatever their delay.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<SchedulerState>>,
}

impl ManualScheduler {
    /// Creates a scheduler with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest pending task. Returns false if nothing was pending.
    pub fn fire_next(&self) -> bool {
        let next = {
            let mut state = lock(&self.state);
            if state.pending.is_empty() {
                None
            } else {
                Some(state.pending.remove(0))
            }
        };
        match next {
            Some(pending) => {
                (pending.task)();
                true
            }
            None => false,
        }
    }

    /// Runs every task pending right now, but none scheduled while doing so.
    /// Returns how many ran.
    pub fn fire_pending(&self) -> usize {
        let batch = std::mem::take(&mut lock(&self.state).pending);
        let count = batch.len();
        for pending in batch {
            (pending.task)();
        }
        count
    }

    /// Number of tasks waiting to fire.
    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Delays of the tasks waiting to fire, oldest first.
    pub fn pending_delays(&self) -> Vec<Duration> {
        lock(&self.state)
            .pending
            .iter()
            .map(|pending| pending.delay)
            .collect()
    }

    /// Delays of every task ever scheduled, cancelled ones included.
    pub fn scheduled_delays(&self) -> Vec<Duration> {
        lock(&self.state).history.clone()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let id = {
            let mut state = lock(&self.state);
            state.next_id += 1;
            let id = state.next_id;
            state.pending.push(PendingTask { id, delay, task });
            state.history.push(delay);
            id
        };
        let state = Arc::clone(&self.state);
        TimerHandle::new(move || {
            lock(&state).pending.retain(|pending| pending.id != id);
        })
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending_delays())
            .finish()
    }
}
