//! Transparent reconnection for message-oriented sockets.
//!
//! A [`ReconnectingSocket`] looks like a single websocket connection, but
//! whenever the underlying connection closes it waits out a backoff delay and
//! opens a new one. Listeners subscribed through the socket are carried over
//! to every new connection; everything else (single-slot handlers, the binary
//! type) belongs to the connection it was set on.
//!
//! # Features
//!
//! - **Backoff with jitter**: the first retry after an open waits between one
//!   and two times the minimum delay, later retries grow geometrically up to a
//!   ceiling
//! - **Durable listeners**: subscriptions are recorded and replayed onto each
//!   replacement connection
//! - **Live properties**: every property read or write goes to whichever
//!   connection is current
//! - **Retry budget**: optionally give up after a number of consecutive
//!   failed attempts, reported as a terminal [`ConnectionState::Failed`]
//! - **Event system**: lifecycle callbacks for opens, closes, scheduled
//!   retries and failures
//!
//! # Examples
//!
//! ## Connecting with the built-in transport
//!
//! Requires the `tungstenite` feature.
//!
//! ```rust,ignore
//! use resocket::{Event, ListenerOptions, ReconnectConfig, ReconnectingSocket, Transport, listener};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), resocket::ReconnectError> {
//! let config = ReconnectConfig::builder()
//!     .min_reconnection_delay(Duration::from_millis(500))
//!     .max_reconnection_delay(Duration::from_secs(30))
//!     .max_retries(20)
//!     .name("quotes")
//!     .on_retry_scheduled(|retry, delay| {
//!         println!("reconnect #{} in {:?}", retry, delay);
//!     })
//!     .build();
//!
//! let socket = ReconnectingSocket::connect("wss://example.com/quotes", config)?;
//! socket.add_event_listener(
//!     Event::MESSAGE,
//!     listener(|event| println!("{:?}", event.payload())),
//!     ListenerOptions::default(),
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Bringing your own transport
//!
//! Any [`Transport`] can be reconnected; configure a factory that creates one
//! per attempt:
//!
//! ```rust,ignore
//! use resocket::ReconnectConfig;
//!
//! let config = ReconnectConfig::builder()
//!     .factory(|url, protocols| my_transport::connect(url, protocols))
//!     .build();
//! ```
//!
//! # Feature flags
//!
//! - `tungstenite`: default transport built on `tokio-tungstenite`
//! - `tracing`: debug logging of transitions (when `debug(true)` is set)
//! - `metrics`: connect, retry and failure counters plus a state gauge
//! - `serde`: deserialize [`ReconnectOptions`] from configuration files
//! - `testing`: in-memory transports and a manual scheduler

mod bridge;
mod config;
mod error;
mod events;
mod policy;
mod registry;
mod socket;
mod state;
mod timer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(feature = "tungstenite")]
pub mod tungstenite;

pub use config::{ReconnectConfig, ReconnectConfigBuilder, ReconnectOptions};
pub use error::ReconnectError;
pub use events::ReconnectEvent;
pub use policy::BackoffPolicy;
pub use registry::ListenerRegistry;
pub use socket::ReconnectingSocket;
pub use state::{ConnectionState, ReconnectState};
pub use timer::{Scheduler, Task, TimerHandle, TokioScheduler};

// Re-export the transport surface so most callers only need this crate
pub use resocket_core::{
    BinaryType, CloseInfo, Event, EventData, HandlerSlot, Listener, ListenerOptions, Payload,
    ReadyState, SharedTransport, Transport, TransportError, TransportFactory, listener,
};
