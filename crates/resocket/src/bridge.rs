//! The socket seen through the [`Transport`] interface.
//!
//! Every member resolves against whichever underlying connection is current
//! at the moment of the call. Nothing is cached: a handler or binary type set
//! on one connection is read back from that connection, and is gone once it
//! has been replaced. Listener registration is the exception; it goes through
//! the socket's registry so it survives reconnects.

use crate::socket::ReconnectingSocket;
use resocket_core::{
    BinaryType, Event, HandlerSlot, Listener, ListenerOptions, Payload, ReadyState, Transport,
    TransportError,
};

impl ReconnectingSocket {
    /// Ready state of a connection that is being established.
    pub const CONNECTING: ReadyState = ReadyState::Connecting;
    /// Ready state of an open connection.
    pub const OPEN: ReadyState = ReadyState::Open;
    /// Ready state of a connection that is closing.
    pub const CLOSING: ReadyState = ReadyState::Closing;
    /// Ready state of a closed connection.
    pub const CLOSED: ReadyState = ReadyState::Closed;

    /// The open handler of the current connection.
    pub fn onopen(&self) -> Option<Listener> {
        self.handler(HandlerSlot::Open)
    }

    /// Sets the open handler of the current connection only.
    pub fn set_onopen(&self, handler: Option<Listener>) {
        self.set_handler(HandlerSlot::Open, handler);
    }

    /// The message handler of the current connection.
    pub fn onmessage(&self) -> Option<Listener> {
        self.handler(HandlerSlot::Message)
    }

    /// Sets the message handler of the current connection only.
    pub fn set_onmessage(&self, handler: Option<Listener>) {
        self.set_handler(HandlerSlot::Message, handler);
    }

    /// The error handler of the current connection.
    pub fn onerror(&self) -> Option<Listener> {
        self.handler(HandlerSlot::Error)
    }

    /// Sets the error handler of the current connection only.
    pub fn set_onerror(&self, handler: Option<Listener>) {
        self.set_handler(HandlerSlot::Error, handler);
    }

    /// The close handler of the current connection.
    pub fn onclose(&self) -> Option<Listener> {
        self.handler(HandlerSlot::Close)
    }

    /// Sets the close handler of the current connection only.
    pub fn set_onclose(&self, handler: Option<Listener>) {
        self.set_handler(HandlerSlot::Close, handler);
    }
}

impl Transport for ReconnectingSocket {
    fn url(&self) -> String {
        self.current().url()
    }

    fn ready_state(&self) -> ReadyState {
        self.current().ready_state()
    }

    fn buffered_amount(&self) -> usize {
        self.current().buffered_amount()
    }

    fn extensions(&self) -> String {
        self.current().extensions()
    }

    fn protocol(&self) -> String {
        self.current().protocol()
    }

    fn binary_type(&self) -> BinaryType {
        self.current().binary_type()
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        self.current().set_binary_type(binary_type);
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        self.current().send(payload)
    }

    /// Closes the current connection.
    ///
    /// The socket treats this like any other close and schedules a reconnect.
    /// Drop the socket to stop for good.
    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), TransportError> {
        self.current().close(code, reason)
    }

    fn dispatch_event(&self, event: Event) -> bool {
        self.current().dispatch_event(event)
    }

    fn add_event_listener(&self, kind: &str, listener: Listener, options: ListenerOptions) {
        self.subscribe(kind, listener, options);
    }

    fn remove_event_listener(&self, kind: &str, listener: &Listener, options: ListenerOptions) {
        self.unsubscribe(kind, listener, options);
    }

    fn handler(&self, slot: HandlerSlot) -> Option<Listener> {
        self.current().handler(slot)
    }

    fn set_handler(&self, slot: HandlerSlot, handler: Option<Listener>) {
        self.current().set_handler(slot, handler);
    }
}
