//! Reconnect stress tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use resocket::testing::{ManualScheduler, MockFactory};
use resocket::{
    ConnectionState, Event, ListenerOptions, ReconnectConfig, ReconnectingSocket, listener,
};

use super::ConcurrencyTracker;

fn socket(factory: &MockFactory, scheduler: &ManualScheduler) -> ReconnectingSocket {
    let config = ReconnectConfig::builder()
        .shared_factory(factory.factory())
        .scheduler(scheduler.clone())
        .min_reconnection_delay(Duration::from_millis(1))
        .max_reconnection_delay(Duration::from_millis(50))
        .build();
    ReconnectingSocket::connect("ws://stress", config).unwrap()
}

/// Test: High volume of connection replacements
#[test]
#[ignore]
fn stress_many_replacements() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = socket(&factory, &scheduler);

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    socket.subscribe(
        Event::MESSAGE,
        listener(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }),
        ListenerOptions::default(),
    );

    let start = Instant::now();
    let cycles = 100_000;
    for _ in 0..cycles {
        let transport = factory.last().unwrap();
        transport.fire_open();
        transport.fire_message("tick");
        transport.fire_close(1006);
        assert!(scheduler.fire_next());
    }
    let elapsed = start.elapsed();

    println!("{} replacements in {:?}", cycles, elapsed);
    assert_eq!(calls.load(Ordering::SeqCst), cycles);
    assert_eq!(socket.subscription_count(Event::MESSAGE), 1);
    assert_eq!(factory.last().unwrap().listener_count(Event::MESSAGE), 1);
    assert_eq!(socket.retry_count(), 1);
}

/// Test: Concurrent close events on the same connection schedule one retry
#[test]
#[ignore]
fn stress_concurrent_close_storm() {
    let threads = 32;

    for _ in 0..200 {
        let factory = MockFactory::new();
        let scheduler = ManualScheduler::new();
        let socket = socket(&factory, &scheduler);
        let transport = factory.last().unwrap();
        let barrier = Arc::new(Barrier::new(threads));
        let tracker = ConcurrencyTracker::new();

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let transport = Arc::clone(&transport);
                let barrier = Arc::clone(&barrier);
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    barrier.wait();
                    tracker.enter();
                    transport.fire_close(1006);
                    tracker.exit();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(tracker.peak() >= 1);
        assert_eq!(socket.retry_count(), 1);
        assert_eq!(scheduler.pending_count(), 1);
        assert_eq!(socket.connection_state(), ConnectionState::Closed);
    }
}

/// Test: Subscriptions racing with replacements are never lost or doubled
#[test]
#[ignore]
fn stress_subscribe_during_reconnects() {
    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let socket = Arc::new(socket(&factory, &scheduler));
    let subscribers = 8;
    let per_thread = 250;

    let reconnector = {
        let factory = factory.clone();
        let scheduler = scheduler.clone();
        thread::spawn(move || {
            for _ in 0..2_000 {
                if let Some(transport) = factory.last() {
                    transport.fire_close(1006);
                }
                scheduler.fire_pending();
            }
        })
    };

    let handles: Vec<_> = (0..subscribers)
        .map(|_| {
            let socket = Arc::clone(&socket);
            thread::spawn(move || {
                for _ in 0..per_thread {
                    socket.subscribe(Event::MESSAGE, listener(|_| {}), ListenerOptions::default());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    reconnector.join().unwrap();

    // One more replacement after every subscription is recorded.
    factory.last().unwrap().fire_close(1006);
    scheduler.fire_pending();

    let expected = subscribers * per_thread;
    assert_eq!(socket.subscription_count(Event::MESSAGE), expected);
    assert_eq!(factory.last().unwrap().listener_count(Event::MESSAGE), expected);
}
