//! Core vocabulary for resocket.
//!
//! This crate holds the pieces shared by every resocket transport and by the
//! reconnecting wrapper itself:
//! - [`Transport`]: the surface of a message-oriented socket connection
//! - [`Event`], [`Listener`] and [`ListenerSet`]: event-target style subscriptions
//! - [`events`]: lifecycle observers for observability

pub mod events;
pub mod target;
pub mod transport;

pub use events::{FnObserver, LifecycleEvent, LifecycleObserver, Observers};
pub use target::{
    CloseInfo, Event, EventData, HandlerSlot, HandlerSlots, Listener, ListenerOptions,
    ListenerSet, Payload, dispatch, listener,
};
pub use transport::{
    BinaryType, ReadyState, SharedTransport, Transport, TransportError, TransportFactory,
    validate_close_code,
};
