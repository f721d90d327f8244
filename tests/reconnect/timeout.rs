use super::{builder, connect, drop_and_replace};
use resocket::testing::{ManualScheduler, MockFactory};
use resocket::{ConnectionState, ReconnectEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn timeout_is_inert_by_default() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = connect(
        builder(&factory, &scheduler)
            .connection_timeout(Duration::from_millis(50))
            .build(),
    );

    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(socket.connection_state(), ConnectionState::Connecting);
}

#[test]
fn enforced_timeout_aborts_and_retries() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    let socket = connect(
        builder(&factory, &scheduler)
            .connection_timeout(Duration::from_millis(4000))
            .enforce_connection_timeout(true)
            .on_event(move |event| events_clone.lock().unwrap().push(event.clone()))
            .build(),
    );

    assert_eq!(scheduler.pending_delays(), vec![Duration::from_millis(4000)]);
    assert!(scheduler.fire_next());

    let stalled = factory.last().unwrap();
    assert_eq!(stalled.close_calls(), vec![Some(4000)]);
    assert_eq!(socket.connection_state(), ConnectionState::Closed);
    assert_eq!(socket.retry_count(), 1);

    let pending = scheduler.pending_delays();
    assert_eq!(pending.len(), 1);
    assert!(pending[0] >= Duration::from_millis(100) && pending[0] < Duration::from_millis(200));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|event| matches!(
        event,
        ReconnectEvent::ConnectionTimedOut { timeout, .. } if *timeout == Duration::from_millis(4000)
    )));
    let closes = events
        .iter()
        .filter(|event| matches!(event, ReconnectEvent::Closed { .. }))
        .count();
    assert_eq!(closes, 1);
}

#[test]
fn open_cancels_timeout() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = connect(
        builder(&factory, &scheduler)
            .enforce_connection_timeout(true)
            .build(),
    );

    factory.last().unwrap().fire_open();

    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(socket.connection_state(), ConnectionState::Open);
}

#[test]
fn replacement_connections_get_their_own_timeout() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let _socket = connect(
        builder(&factory, &scheduler)
            .connection_timeout(Duration::from_secs(2))
            .enforce_connection_timeout(true)
            .build(),
    );

    // The close cancels the first timeout; the retry is then the only timer.
    drop_and_replace(&factory, &scheduler);

    assert_eq!(scheduler.pending_delays(), vec![Duration::from_secs(2)]);
    assert_eq!(factory.created(), 2);
}
