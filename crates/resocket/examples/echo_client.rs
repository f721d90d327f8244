//! Echo client that survives server restarts.
//!
//! Run with: cargo run --example echo_client -p resocket --features tungstenite,tracing -- ws://127.0.0.1:9001
//!
//! Start any websocket echo server on that address, then stop and restart it
//! while the client runs: the client reconnects with backoff and keeps its
//! message listener.

use resocket::{
    ConnectionState, Event, ListenerOptions, ReadyState, ReconnectConfig, ReconnectingSocket,
    Transport, listener,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("resocket=debug")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001".to_string());

    let config = ReconnectConfig::builder()
        .name("echo")
        .debug(true)
        .min_reconnection_delay(Duration::from_millis(250))
        .max_reconnection_delay(Duration::from_secs(5))
        .max_retries(10)
        .on_open(|| println!("connected"))
        .on_close(|code, retry| println!("closed (code {:?}), retry #{}", code, retry))
        .on_retry_scheduled(|retry, delay| println!("retry #{} in {:?}", retry, delay))
        .on_failure(|err| println!("giving up: {}", err))
        .build();

    let socket = ReconnectingSocket::connect(url, config)?;
    socket.add_event_listener(
        Event::MESSAGE,
        listener(|event| {
            if let Some(text) = event.payload().and_then(|payload| payload.as_text()) {
                println!("echo: {}", text);
            }
        }),
        ListenerOptions::default(),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for n in 0..60 {
        ticker.tick().await;
        if socket.connection_state() == ConnectionState::Failed {
            break;
        }
        if socket.ready_state() == ReadyState::Open {
            socket.send(format!("ping {}", n).into())?;
        }
    }

    Ok(())
}
