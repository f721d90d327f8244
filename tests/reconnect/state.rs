use super::{builder, connect, drop_and_replace};
use resocket::ConnectionState;
use resocket::testing::{ManualScheduler, MockFactory};
use std::time::Duration;

#[test]
fn state_starts_connecting() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = connect(builder(&factory, &scheduler).build());
    let state = socket.state();

    assert_eq!(state.state(), ConnectionState::Connecting);
    assert_eq!(state.retry_count(), 0);
    assert_eq!(state.connections(), 1);
    assert_eq!(state.current_delay(), Duration::ZERO);
    assert!(state.time_since_open().is_none());
}

#[test]
fn connection_state_variants() {
    let states = [
        ConnectionState::Connecting,
        ConnectionState::Open,
        ConnectionState::Closed,
        ConnectionState::Failed,
    ];

    for (i, a) in states.iter().enumerate() {
        for b in &states[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(
        states.iter().filter(|state| state.is_terminal()).count(),
        1
    );
}

#[test]
fn cloned_state_follows_the_socket() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = connect(builder(&factory, &scheduler).build());
    let state = socket.state().clone();

    factory.last().unwrap().fire_close(1006);

    assert_eq!(state.state(), ConnectionState::Closed);
    assert_eq!(state.retry_count(), 1);
    assert!(state.current_delay() >= Duration::from_millis(100));

    scheduler.fire_next();
    assert_eq!(state.state(), ConnectionState::Connecting);
    assert_eq!(state.connections(), 2);
}

#[test]
fn open_clears_retry_bookkeeping() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = connect(builder(&factory, &scheduler).build());

    drop_and_replace(&factory, &scheduler);
    drop_and_replace(&factory, &scheduler);
    assert_eq!(socket.state().retry_count(), 2);

    factory.last().unwrap().fire_open();

    let state = socket.state();
    assert_eq!(state.state(), ConnectionState::Open);
    assert_eq!(state.retry_count(), 0);
    assert_eq!(state.current_delay(), Duration::ZERO);
    assert!(state.time_since_open().is_some());
}
