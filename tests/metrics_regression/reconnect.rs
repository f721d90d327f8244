//! Reconnect metrics regression tests

use super::helpers::*;
use resocket::testing::{ManualScheduler, MockFactory};
use resocket::{ReconnectConfig, ReconnectingSocket};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn reconnect_metrics_exist() {
    init_recorder();

    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let config = ReconnectConfig::builder()
        .name("test_reconnect")
        .shared_factory(factory.factory())
        .scheduler(scheduler.clone())
        .min_reconnection_delay(Duration::from_millis(10))
        .build();
    let _socket = ReconnectingSocket::connect("ws://metrics", config).unwrap();

    factory.last().unwrap().fire_close(1006);
    scheduler.fire_next();

    assert_counter_exists("resocket_connect_attempts_total");
    assert_metric_has_label("resocket_connect_attempts_total", "socket", "test_reconnect");

    assert_counter_exists("resocket_retries_scheduled_total");
    assert_metric_has_label("resocket_retries_scheduled_total", "socket", "test_reconnect");

    assert_gauge_exists("resocket_state");
    assert_metric_has_label("resocket_state", "socket", "test_reconnect");
}

#[test]
#[serial]
fn reconnect_budget_exceeded_metrics() {
    init_recorder();

    let factory = MockFactory::new();
    let scheduler = ManualScheduler::new();
    let config = ReconnectConfig::builder()
        .name("exhausted_reconnect")
        .shared_factory(factory.factory())
        .scheduler(scheduler.clone())
        .max_retries(0)
        .build();
    let _socket = ReconnectingSocket::connect("ws://metrics", config).unwrap();

    factory.last().unwrap().fire_close(1006);

    assert_counter_exists("resocket_retry_budget_exceeded_total");
    assert_metric_has_label(
        "resocket_retry_budget_exceeded_total",
        "socket",
        "exhausted_reconnect",
    );
}
