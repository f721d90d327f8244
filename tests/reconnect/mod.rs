//! Comprehensive tests for the reconnecting socket.
//!
//! Test organization:
//! - integration.rs: Backoff, retry ceiling, replay and bridge tests driven by mock transports
//! - timeout.rs: Connection timeout enforcement
//! - runtime.rs: The same behavior on a tokio runtime with paused time
//! - config.rs: Configuration and builder tests
//! - state.rs: Connection state tracking tests

mod runtime;
mod state;
mod timeout;

use resocket::testing::{ManualScheduler, MockFactory};
use resocket::{ReconnectConfig, ReconnectConfigBuilder, ReconnectingSocket};
use std::time::Duration;

/// Builder preloaded with a mock factory, a manual scheduler and the
/// `{min: 100ms, max: 1s, grow: 2}` backoff used throughout these tests.
pub(crate) fn builder(factory: &MockFactory, scheduler: &ManualScheduler) -> ReconnectConfigBuilder {
    ReconnectConfig::builder()
        .shared_factory(factory.factory())
        .scheduler(scheduler.clone())
        .min_reconnection_delay(Duration::from_millis(100))
        .max_reconnection_delay(Duration::from_millis(1000))
        .reconnection_delay_grow_factor(2.0)
}

pub(crate) fn connect(config: ReconnectConfig) -> ReconnectingSocket {
    ReconnectingSocket::connect("ws://test/feed", config).unwrap()
}

/// Closes the current connection and lets the retry timer fire.
pub(crate) fn drop_and_replace(factory: &MockFactory, scheduler: &ManualScheduler) {
    factory.last().unwrap().fire_close(1006);
    assert!(scheduler.fire_next(), "no retry was scheduled");
}
