//! The transport abstraction.
//!
//! A [`Transport`] is one underlying, message-oriented socket connection with
//! a DOM-socket shaped surface: readiness state, send/close, event listeners
//! and single-slot `on*` handlers. Transports are created by a
//! [`TransportFactory`] and are never reopened once closed.

use std::fmt;
use std::sync::Arc;

use crate::target::{Event, HandlerSlot, Listener, ListenerOptions, Payload};

/// Readiness state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ReadyState {
    /// The connection has not yet been established.
    Connecting = 0,
    /// The connection is established and messages can be sent.
    Open = 1,
    /// The closing handshake is in progress.
    Closing = 2,
    /// The connection is closed or could not be opened.
    Closed = 3,
}

impl ReadyState {
    /// Returns the numeric value used on the web platform (0 through 3).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a numeric ready state. Out-of-range values decode as `Closed`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "CONNECTING",
            ReadyState::Open => "OPEN",
            ReadyState::Closing => "CLOSING",
            ReadyState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// How a transport delivers incoming binary frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryType {
    /// Binary frames arrive as [`Payload::Binary`].
    #[default]
    Bytes,
    /// Binary frames are decoded (lossily) and arrive as [`Payload::Text`].
    Utf8Lossy,
}

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The operation needs an open connection.
    #[error("transport is not open (state: {0})")]
    NotOpen(ReadyState),

    /// The target address could not be used.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl {
        /// The rejected address.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The close code is not one a client may send.
    #[error("invalid close code {0}; expected 1000 or 3000-4999")]
    InvalidCloseCode(u16),

    /// The connection could not be started.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// One underlying socket connection.
///
/// Implementations must be cheap to query: the reconnecting wrapper resolves
/// every property access against the current transport. Events are delivered
/// to listeners in registration order, followed by the matching single-slot
/// handler.
pub trait Transport: Send + Sync {
    /// The address this transport was created for.
    fn url(&self) -> String;

    /// Current readiness state.
    fn ready_state(&self) -> ReadyState;

    /// Bytes queued by `send` but not yet written to the network.
    fn buffered_amount(&self) -> usize;

    /// Extensions negotiated with the server.
    fn extensions(&self) -> String;

    /// Sub-protocol selected by the server, or an empty string.
    fn protocol(&self) -> String;

    /// How incoming binary frames are delivered.
    fn binary_type(&self) -> BinaryType;

    /// Changes how incoming binary frames are delivered.
    fn set_binary_type(&self, binary_type: BinaryType);

    /// Queues a payload for sending.
    fn send(&self, payload: Payload) -> Result<(), TransportError>;

    /// Starts the closing handshake. Closing an already closed transport is a no-op.
    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), TransportError>;

    /// Delivers `event` to this transport's listeners. Returns true.
    fn dispatch_event(&self, event: Event) -> bool;

    /// Registers a listener for an event type.
    fn add_event_listener(&self, kind: &str, listener: Listener, options: ListenerOptions);

    /// Unregisters a listener for an event type.
    fn remove_event_listener(&self, kind: &str, listener: &Listener, options: ListenerOptions);

    /// Returns the single-slot handler in `slot`.
    fn handler(&self, slot: HandlerSlot) -> Option<Listener>;

    /// Replaces the single-slot handler in `slot`.
    fn set_handler(&self, slot: HandlerSlot, handler: Option<Listener>);
}

/// A transport shared between its creator and the wrapper.
pub type SharedTransport = Arc<dyn Transport>;

/// Creates a new transport for a url and a list of sub-protocols.
pub type TransportFactory =
    Arc<dyn Fn(&str, &[String]) -> Result<SharedTransport, TransportError> + Send + Sync>;

/// Validates a close code the way a client-side socket does.
pub fn validate_close_code(code: Option<u16>) -> Result<(), TransportError> {
    match code {
        None | Some(1000) | Some(3000..=4999) => Ok(()),
        Some(other) => Err(TransportError::InvalidCloseCode(other)),
    }
}
