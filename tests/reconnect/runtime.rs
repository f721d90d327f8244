//! The socket on a real tokio runtime, with paused time.

use resocket::testing::MockFactory;
use resocket::{ConnectionState, ReconnectConfig, ReconnectingSocket};
use std::time::Duration;

fn config(factory: &MockFactory) -> resocket::ReconnectConfigBuilder {
    ReconnectConfig::builder()
        .shared_factory(factory.factory())
        .min_reconnection_delay(Duration::from_millis(100))
        .max_reconnection_delay(Duration::from_secs(1))
        .reconnection_delay_grow_factor(2.0)
}

#[tokio::test(start_paused = true)]
async fn tokio_scheduler_drives_retries() {
    let factory = MockFactory::new();
    let socket = ReconnectingSocket::connect("ws://runtime", config(&factory).build()).unwrap();

    factory.last().unwrap().fire_close(1006);
    tokio::time::sleep(Duration::from_millis(99)).await;
    assert_eq!(factory.created(), 1);

    tokio::time::sleep(Duration::from_millis(101)).await;
    assert_eq!(factory.created(), 2);
    assert_eq!(socket.connection_state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn enforced_timeout_fires_on_runtime() {
    let factory = MockFactory::new();
    let socket = ReconnectingSocket::connect(
        "ws://runtime",
        config(&factory)
            .connection_timeout(Duration::from_millis(500))
            .enforce_connection_timeout(true)
            .build(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(501)).await;
    assert_eq!(factory.get(0).unwrap().close_calls(), vec![Some(4000)]);
    assert_eq!(socket.retry_count(), 1);

    // Retry waits between 100 and 200ms.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(factory.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_socket_never_reconnects() {
    let factory = MockFactory::new();
    let socket = ReconnectingSocket::connect("ws://runtime", config(&factory).build()).unwrap();

    factory.last().unwrap().fire_close(1006);
    drop(socket);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(factory.created(), 1);
}
