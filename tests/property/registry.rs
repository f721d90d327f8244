//! Property tests for listener replay.
//!
//! Invariants tested:
//! - After any sequence of subscribe/unsubscribe calls, every replacement
//!   connection carries exactly the surviving subscriptions, each once
//! - Each surviving listener is invoked exactly once per matching event

use proptest::prelude::*;
use resocket::testing::{ManualScheduler, MockFactory};
use resocket::{
    Event, Listener, ListenerOptions, ReconnectConfig, ReconnectingSocket, listener,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const KINDS: [&str; 2] = [Event::MESSAGE, Event::ERROR];

#[derive(Debug, Clone)]
enum Op {
    Subscribe { listener: usize, kind: usize },
    Unsubscribe { listener: usize, kind: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4, 0usize..2).prop_map(|(listener, kind)| Op::Subscribe { listener, kind }),
        (0usize..4, 0usize..2).prop_map(|(listener, kind)| Op::Unsubscribe { listener, kind }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: replay reproduces the surviving subscriptions exactly
    #[test]
    fn replay_matches_surviving_subscriptions(
        ops in prop::collection::vec(op(), 0..20),
        reconnects in 1usize..6,
    ) {
        let factory = MockFactory::new();
        let scheduler = ManualScheduler::new();
        let config = ReconnectConfig::builder()
            .shared_factory(factory.factory())
            .scheduler(scheduler.clone())
            .min_reconnection_delay(Duration::from_millis(10))
            .build();
        let socket = ReconnectingSocket::connect("ws://prop", config).unwrap();

        let counters: Vec<Arc<AtomicUsize>> =
            (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let listeners: Vec<Listener> = counters
            .iter()
            .map(|count| {
                let count = Arc::clone(count);
                listener(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let mut expected = [[false; 2]; 4];
        for op in &ops {
            match *op {
                Op::Subscribe { listener, kind } => {
                    socket.subscribe(KINDS[kind], listeners[listener].clone(), ListenerOptions::default());
                    expected[listener][kind] = true;
                }
                Op::Unsubscribe { listener, kind } => {
                    socket.unsubscribe(KINDS[kind], &listeners[listener], ListenerOptions::default());
                    expected[listener][kind] = false;
                }
            }
        }

        for _ in 0..reconnects {
            factory.last().unwrap().fire_close(1006);
            prop_assert!(scheduler.fire_next());
        }

        let transport = factory.last().unwrap();
        for (kind_index, kind) in KINDS.iter().enumerate() {
            let surviving = (0..4).filter(|&l| expected[l][kind_index]).count();
            prop_assert_eq!(transport.listener_count(kind), surviving);
            prop_assert_eq!(socket.subscription_count(kind), surviving);
            for l in 0..4 {
                prop_assert_eq!(transport.has_listener(kind, &listeners[l]), expected[l][kind_index]);
            }
        }

        transport.fire_open();
        transport.fire_message("m");
        transport.fire_error("e");
        for l in 0..4 {
            let hits = expected[l].iter().filter(|&&subscribed| subscribed).count();
            prop_assert_eq!(counters[l].load(Ordering::SeqCst), hits);
        }
    }
}
