//! Event-target style subscriptions.
//!
//! Transports deliver [`Event`]s to [`Listener`]s registered per event type,
//! with the same rules as a DOM event target: a listener is identified by the
//! allocation behind its `Arc`, registering the same listener twice for the
//! same type (and capture flag) is a no-op, and `once` listeners are dropped
//! after their first invocation.

use std::fmt;
use std::sync::Arc;

/// A message payload. The wrapper never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A UTF-8 text frame.
    Text(String),
    /// A binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns true if the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the text if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes)
    }
}

/// Details carried by a close event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// The close code (1000 for a normal closure, 1006 for an abnormal one).
    pub code: u16,
    /// The close reason sent by the peer, possibly empty.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

/// Data attached to an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    /// No data (open events and custom events).
    None,
    /// An incoming message.
    Message(Payload),
    /// A transport-level error description.
    Error(String),
    /// Connection closure details.
    Close(CloseInfo),
}

/// An event delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: String,
    data: EventData,
}

impl Event {
    /// Event type fired when the connection opens.
    pub const OPEN: &'static str = "open";
    /// Event type fired for every incoming message.
    pub const MESSAGE: &'static str = "message";
    /// Event type fired on a transport error.
    pub const ERROR: &'static str = "error";
    /// Event type fired once the connection is closed.
    pub const CLOSE: &'static str = "close";

    /// Creates a data-less event of an arbitrary type.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: EventData::None,
        }
    }

    /// Creates an `open` event.
    pub fn open() -> Self {
        Self::new(Self::OPEN)
    }

    /// Creates a `message` event.
    pub fn message(payload: impl Into<Payload>) -> Self {
        Self {
            kind: Self::MESSAGE.to_string(),
            data: EventData::Message(payload.into()),
        }
    }

    /// Creates an `error` event.
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            kind: Self::ERROR.to_string(),
            data: EventData::Error(description.into()),
        }
    }

    /// Creates a `close` event.
    pub fn close(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            kind: Self::CLOSE.to_string(),
            data: EventData::Close(CloseInfo {
                code,
                reason: reason.into(),
                was_clean,
            }),
        }
    }

    /// Returns the event type.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the attached data.
    pub fn data(&self) -> &EventData {
        &self.data
    }

    /// Returns the payload of a message event.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.data {
            EventData::Message(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns the details of a close event.
    pub fn close_info(&self) -> Option<&CloseInfo> {
        match &self.data {
            EventData::Close(info) => Some(info),
            _ => None,
        }
    }
}

/// A subscription callback. Identity is the `Arc` allocation.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure into a [`Listener`].
///
/// Keep the returned value around if you intend to remove it later: two
/// separate calls with the same closure produce two distinct listeners.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Options accepted alongside a listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ListenerOptions {
    /// Remove the listener after it fires once.
    pub once: bool,
    /// Capture flag; part of a listener's identity like in a DOM event target.
    pub capture: bool,
}

impl ListenerOptions {
    /// Options for a listener that fires at most once.
    pub fn once() -> Self {
        Self {
            once: true,
            capture: false,
        }
    }
}

/// The four single-slot `on*` handlers of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerSlot {
    /// `onopen`
    Open,
    /// `onmessage`
    Message,
    /// `onerror`
    Error,
    /// `onclose`
    Close,
}

impl HandlerSlot {
    /// Every slot, in index order.
    pub const ALL: [HandlerSlot; 4] = [
        HandlerSlot::Open,
        HandlerSlot::Message,
        HandlerSlot::Error,
        HandlerSlot::Close,
    ];

    /// Returns the event type this slot handles.
    pub fn event_type(self) -> &'static str {
        match self {
            HandlerSlot::Open => Event::OPEN,
            HandlerSlot::Message => Event::MESSAGE,
            HandlerSlot::Error => Event::ERROR,
            HandlerSlot::Close => Event::CLOSE,
        }
    }

    /// Returns the slot handling the given event type, if any.
    pub fn for_event_type(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.event_type() == kind)
    }

    fn index(self) -> usize {
        match self {
            HandlerSlot::Open => 0,
            HandlerSlot::Message => 1,
            HandlerSlot::Error => 2,
            HandlerSlot::Close => 3,
        }
    }
}

/// Storage for the single-slot handlers of one transport.
#[derive(Clone, Default)]
pub struct HandlerSlots {
    slots: [Option<Listener>; 4],
}

impl HandlerSlots {
    /// Returns the handler in `slot`.
    pub fn get(&self, slot: HandlerSlot) -> Option<Listener> {
        self.slots[slot.index()].clone()
    }

    /// Replaces the handler in `slot`.
    pub fn set(&mut self, slot: HandlerSlot, handler: Option<Listener>) {
        self.slots[slot.index()] = handler;
    }

    /// Returns the handler for an event type, if one is set.
    pub fn for_event(&self, kind: &str) -> Option<Listener> {
        HandlerSlot::for_event_type(kind).and_then(|slot| self.get(slot))
    }
}

impl fmt::Debug for HandlerSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("HandlerSlots");
        for slot in HandlerSlot::ALL {
            debug.field(slot.event_type(), &self.slots[slot.index()].is_some());
        }
        debug.finish()
    }
}

struct Entry {
    kind: String,
    listener: Listener,
    options: ListenerOptions,
}

/// The listener table of a single transport.
///
/// Transports keep one of these behind a lock, call
/// [`ListenerSet::take_for_dispatch`] while holding it, and invoke the
/// returned listeners with [`dispatch`] after releasing it.
#[derive(Default)]
pub struct ListenerSet {
    entries: Vec<Entry>,
}

impl ListenerSet {
    /// Creates an empty listener set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Returns false if it was already registered.
    pub fn add(&mut self, kind: &str, listener: Listener, options: ListenerOptions) -> bool {
        if self.position(kind, &listener, options.capture).is_some() {
            return false;
        }
        self.entries.push(Entry {
            kind: kind.to_string(),
            listener,
            options,
        });
        true
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove(&mut self, kind: &str, listener: &Listener, options: ListenerOptions) -> bool {
        match self.position(kind, listener, options.capture) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns true if `listener` is registered for `kind` (either capture flag).
    pub fn contains(&self, kind: &str, listener: &Listener) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind == kind && Arc::ptr_eq(&entry.listener, listener))
    }

    /// Returns the listeners to invoke for an event of type `kind`, in
    /// registration order, dropping `once` listeners from the set.
    pub fn take_for_dispatch(&mut self, kind: &str) -> Vec<Listener> {
        let matching = self
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.listener.clone())
            .collect();
        self.entries
            .retain(|entry| !(entry.kind == kind && entry.options.once));
        matching
    }

    /// Returns the number of listeners registered for `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.entries.iter().filter(|entry| entry.kind == kind).count()
    }

    /// Returns the total number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, kind: &str, listener: &Listener, capture: bool) -> Option<usize> {
        self.entries.iter().position(|entry| {
            entry.kind == kind
                && entry.options.capture == capture
                && Arc::ptr_eq(&entry.listener, listener)
        })
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| (&entry.kind, entry.options)))
            .finish()
    }
}

/// Invokes each listener with `event`.
///
/// A panicking listener does not stop delivery to the ones after it.
pub fn dispatch(listeners: &[Listener], event: &Event) {
    for listener in listeners {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event)));

        #[cfg(feature = "tracing")]
        if outcome.is_err() {
            tracing::warn!(event = event.kind(), "socket event listener panicked");
        }
        #[cfg(not(feature = "tracing"))]
        let _ = outcome;
    }
}
