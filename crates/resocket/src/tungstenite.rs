//! A [`Transport`] over `tokio-tungstenite`.
//!
//! Each transport owns one background task that performs the handshake, then
//! shuttles frames between the socket and the handle. The handle talks to the
//! task over a channel; events are dispatched from the task.
//!
//! Dropping the last handle closes the connection and stops the task.

use futures::{SinkExt, StreamExt};
use resocket_core::{
    BinaryType, Event, HandlerSlot, HandlerSlots, Listener, ListenerOptions, ListenerSet, Payload,
    ReadyState, SharedTransport, Transport, TransportError, TransportFactory, dispatch,
    validate_close_code,
};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Longest close reason a client may send, in bytes.
const MAX_CLOSE_REASON: usize = 123;

/// Close code for a connection that dropped without a closing handshake.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code for a close frame that carried no code.
const NO_STATUS: u16 = 1005;

enum Command {
    Send(Payload),
    Close { code: Option<u16>, reason: String },
}

struct State {
    url: String,
    ready_state: AtomicU8,
    buffered: AtomicUsize,
    binary_type: Mutex<BinaryType>,
    protocol: Mutex<String>,
    extensions: Mutex<String>,
    listeners: Mutex<ListenerSet>,
    handlers: Mutex<HandlerSlots>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl State {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::Acquire))
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state.as_u8(), Ordering::Release);
    }

    fn dispatch(&self, event: Event) {
        let mut listeners = lock(&self.listeners).take_for_dispatch(event.kind());
        if let Some(handler) = lock(&self.handlers).for_event(event.kind()) {
            listeners.push(handler);
        }
        dispatch(&listeners, &event);
    }

    fn finish(&self, code: u16, reason: String, was_clean: bool) {
        self.set_ready_state(ReadyState::Closed);
        self.buffered.store(0, Ordering::Release);
        self.dispatch(Event::close(code, reason, was_clean));
    }

    fn fail(&self, error: impl std::fmt::Display) {
        #[cfg(feature = "tracing")]
        tracing::debug!(url = %self.url, error = %error, "websocket failed");
        self.dispatch(Event::error(error.to_string()));
        self.finish(ABNORMAL_CLOSURE, String::new(), false);
    }

    fn deliver(&self, message: Message) {
        let payload = match message {
            Message::Text(text) => Payload::Text(text.as_str().to_owned()),
            Message::Binary(bytes) => match *lock(&self.binary_type) {
                BinaryType::Bytes => Payload::Binary(bytes.to_vec()),
                BinaryType::Utf8Lossy => Payload::Text(String::from_utf8_lossy(&bytes).into_owned()),
            },
            _ => return,
        };
        self.dispatch(Event::message(payload));
    }
}

/// A websocket connection driven by a background tokio task.
pub struct TungsteniteTransport {
    state: Arc<State>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TungsteniteTransport {
    /// Starts connecting to `url`, offering `protocols`.
    ///
    /// Returns as soon as the connection task is spawned; the outcome of the
    /// handshake is reported through open, error and close events.
    ///
    /// # Errors
    ///
    /// Fails if `url` is not a valid websocket address or the protocol list
    /// cannot be sent as a header, or if called outside a tokio runtime.
    pub fn connect(url: &str, protocols: &[String]) -> Result<SharedTransport, TransportError> {
        let request = build_request(url, protocols)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::Connect("no tokio runtime running".to_string()))?;

        let state = Arc::new(State {
            url: url.to_string(),
            ready_state: AtomicU8::new(ReadyState::Connecting.as_u8()),
            buffered: AtomicUsize::new(0),
            binary_type: Mutex::new(BinaryType::default()),
            protocol: Mutex::new(String::new()),
            extensions: Mutex::new(String::new()),
            listeners: Mutex::new(ListenerSet::new()),
            handlers: Mutex::new(HandlerSlots::default()),
        });
        let (commands, receiver) = mpsc::unbounded_channel();
        runtime.spawn(run(Arc::clone(&state), request, receiver));

        Ok(Arc::new(Self { state, commands }))
    }

    /// The factory used when no other is configured.
    pub fn factory() -> TransportFactory {
        Arc::new(|url: &str, protocols: &[String]| Self::connect(url, protocols))
    }
}

fn build_request(url: &str, protocols: &[String]) -> Result<Request, TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let mut request = url
        .into_client_request()
        .map_err(|err| invalid(err.to_string()))?;
    if !protocols.is_empty() {
        let header = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|err| invalid(format!("bad subprotocol list: {err}")))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", header);
    }
    Ok(request)
}

async fn run(state: Arc<State>, request: Request, mut commands: mpsc::UnboundedReceiver<Command>) {
    let connect = tokio_tungstenite::connect_async(request);
    tokio::pin!(connect);

    let (stream, response) = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok(connected) => break connected,
                Err(err) => {
                    state.fail(err);
                    return;
                }
            },
            command = commands.recv() => match command {
                // Sends are rejected before the connection opens.
                Some(Command::Send(_)) => {}
                Some(Command::Close { .. }) => {
                    state.finish(ABNORMAL_CLOSURE, String::new(), false);
                    return;
                }
                None => {
                    state.set_ready_state(ReadyState::Closed);
                    return;
                }
            },
        }
    };

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    *lock(&state.protocol) = header("sec-websocket-protocol");
    *lock(&state.extensions) = header("sec-websocket-extensions");

    #[cfg(feature = "tracing")]
    tracing::debug!(url = %state.url, "websocket open");
    state.set_ready_state(ReadyState::Open);
    state.dispatch(Event::open());

    let (mut sink, mut stream) = stream.split();
    let mut received_close: Option<(u16, String)> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(payload)) => {
                    let len = payload.len();
                    let message = match payload {
                        Payload::Text(text) => Message::text(text),
                        Payload::Binary(bytes) => Message::binary(bytes),
                    };
                    let result = sink.send(message).await;
                    state.buffered.fetch_sub(len, Ordering::AcqRel);
                    if let Err(err) = result {
                        state.fail(err);
                        return;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    let frame = code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    });
                    if let Err(err) = sink.send(Message::Close(frame)).await {
                        state.fail(err);
                        return;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    state.set_ready_state(ReadyState::Closed);
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Close(frame))) => {
                    state.set_ready_state(ReadyState::Closing);
                    received_close = Some(frame.map_or((NO_STATUS, String::new()), |frame| {
                        (u16::from(frame.code), frame.reason.as_str().to_owned())
                    }));
                }
                Some(Ok(message)) => state.deliver(message),
                Some(Err(err)) => {
                    match received_close.take() {
                        Some((code, reason)) => state.finish(code, reason, true),
                        None => state.fail(err),
                    }
                    return;
                }
                None => {
                    match received_close.take() {
                        Some((code, reason)) => state.finish(code, reason, true),
                        None => state.finish(ABNORMAL_CLOSURE, String::new(), false),
                    }
                    return;
                }
            },
        }
    }
}

impl Transport for TungsteniteTransport {
    fn url(&self) -> String {
        self.state.url.clone()
    }

    fn ready_state(&self) -> ReadyState {
        self.state.ready_state()
    }

    fn buffered_amount(&self) -> usize {
        self.state.buffered.load(Ordering::Acquire)
    }

    fn extensions(&self) -> String {
        lock(&self.state.extensions).clone()
    }

    fn protocol(&self) -> String {
        lock(&self.state.protocol).clone()
    }

    fn binary_type(&self) -> BinaryType {
        *lock(&self.state.binary_type)
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *lock(&self.state.binary_type) = binary_type;
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let state = self.state.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        let len = payload.len();
        self.state.buffered.fetch_add(len, Ordering::AcqRel);
        self.commands.send(Command::Send(payload)).map_err(|_| {
            self.state.buffered.fetch_sub(len, Ordering::AcqRel);
            TransportError::NotOpen(self.state.ready_state())
        })
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<(), TransportError> {
        validate_close_code(code)?;
        let reason = reason.unwrap_or_default();
        if reason.len() > MAX_CLOSE_REASON {
            return Err(TransportError::Other(format!(
                "close reason is {} bytes, at most {MAX_CLOSE_REASON} allowed",
                reason.len()
            )));
        }
        if matches!(
            self.state.ready_state(),
            ReadyState::Closing | ReadyState::Closed
        ) {
            return Ok(());
        }
        self.state.set_ready_state(ReadyState::Closing);
        // The task is gone only once the connection is closed already.
        let _ = self.commands.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn dispatch_event(&self, event: Event) -> bool {
        self.state.dispatch(event);
        true
    }

    fn add_event_listener(&self, kind: &str, listener: Listener, options: ListenerOptions) {
        lock(&self.state.listeners).add(kind, listener, options);
    }

    fn remove_event_listener(&self, kind: &str, listener: &Listener, options: ListenerOptions) {
        lock(&self.state.listeners).remove(kind, listener, options);
    }

    fn handler(&self, slot: HandlerSlot) -> Option<Listener> {
        lock(&self.state.handlers).get(slot)
    }

    fn set_handler(&self, slot: HandlerSlot, handler: Option<Listener>) {
        lock(&self.state.handlers).set(slot, handler);
    }
}

impl std::fmt::Debug for TungsteniteTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteTransport")
            .field("url", &self.state.url)
            .field("ready_state", &self.state.ready_state())
            .finish()
    }
}
