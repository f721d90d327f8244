//! Reconnection options, the immutable per-socket configuration and its builder.

use crate::error::ReconnectError;
use crate::events::ReconnectEvent;
use crate::policy::BackoffPolicy;
use crate::timer::Scheduler;
use resocket_core::events::{FnObserver, Observers};
use resocket_core::{SharedTransport, TransportError, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MAX_RECONNECTION_DELAY: Duration = Duration::from_millis(10_000);
const DEFAULT_MIN_RECONNECTION_DELAY: Duration = Duration::from_millis(1_500);
const DEFAULT_GROW_FACTOR: f64 = 1.3;
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(4_000);

/// Caller-supplied reconnection options.
///
/// Every field is optional: a field that is `Some` overrides the default even
/// when it is zero or `false`, a field that is `None` keeps the default. With
/// the `serde` feature this can be read straight from a configuration file;
/// the camel-case key names (`minReconnectionDelay`, ...) are accepted as
/// aliases.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, deny_unknown_fields)
)]
pub struct ReconnectOptions {
    /// Delay ceiling in milliseconds.
    #[cfg_attr(feature = "serde", serde(alias = "maxReconnectionDelay"))]
    pub max_reconnection_delay_ms: Option<u64>,
    /// Base delay in milliseconds; the first retry waits between one and two times this.
    #[cfg_attr(feature = "serde", serde(alias = "minReconnectionDelay"))]
    pub min_reconnection_delay_ms: Option<u64>,
    /// Factor applied to the previous delay for every following retry.
    #[cfg_attr(feature = "serde", serde(alias = "reconnectionDelayGrowFactor"))]
    pub reconnection_delay_grow_factor: Option<f64>,
    /// Connection timeout in milliseconds.
    #[cfg_attr(feature = "serde", serde(alias = "connectionTimeout"))]
    pub connection_timeout_ms: Option<u64>,
    /// Abort and retry attempts that do not open within the connection timeout.
    #[cfg_attr(feature = "serde", serde(alias = "enforceConnectionTimeout"))]
    pub enforce_connection_timeout: Option<bool>,
    /// Consecutive failed attempts tolerated before giving up. Absent means unbounded.
    #[cfg_attr(feature = "serde", serde(alias = "maxRetries"))]
    pub max_retries: Option<u32>,
    /// Log lifecycle transitions at debug level.
    pub debug: Option<bool>,
    /// Name used in lifecycle events, logs and metrics.
    pub name: Option<String>,
}

impl ReconnectOptions {
    /// Overlays every field present in `other` onto `self`.
    pub fn merge(&mut self, other: ReconnectOptions) {
        macro_rules! overlay {
            ($($field:ident),+) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })+
            };
        }
        overlay!(
            max_reconnection_delay_ms,
            min_reconnection_delay_ms,
            reconnection_delay_grow_factor,
            connection_timeout_ms,
            enforce_connection_timeout,
            max_retries,
            debug,
            name
        );
    }
}

/// Immutable per-socket configuration.
///
/// Built by [`ReconnectConfigBuilder`], which merges caller options over a
/// fixed set of defaults; two sockets never share mutable configuration.
#[derive(Clone)]
pub struct ReconnectConfig {
    pub(crate) factory: Option<TransportFactory>,
    pub(crate) scheduler: Option<Arc<dyn Scheduler>>,
    pub(crate) policy: BackoffPolicy,
    pub(crate) connection_timeout: Duration,
    pub(crate) enforce_connection_timeout: bool,
    pub(crate) max_retries: Option<u32>,
    pub(crate) debug: bool,
    pub(crate) name: String,
    pub(crate) observers: Observers<ReconnectEvent>,
}

impl std::fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("name", &self.name)
            .field("factory", &self.factory.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("policy", &self.policy)
            .field("connection_timeout", &self.connection_timeout)
            .field("enforce_connection_timeout", &self.enforce_connection_timeout)
            .field("max_retries", &self.max_retries)
            .field("debug", &self.debug)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ReconnectConfig {
    /// Creates a new builder for configuring reconnection behavior.
    pub fn builder() -> ReconnectConfigBuilder {
        ReconnectConfigBuilder::default()
    }

    /// Returns the backoff policy.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Returns the connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns whether stalled attempts are aborted after the connection timeout.
    pub fn enforces_connection_timeout(&self) -> bool {
        self.enforce_connection_timeout
    }

    /// Returns the retry ceiling. `None` means unbounded.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Returns whether debug logging is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the socket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if a transport factory was configured explicitly.
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ReconnectError> {
        let factor = self.policy.grow_factor();
        if !factor.is_finite() || factor <= 1.0 {
            return Err(ReconnectError::InvalidConfig(format!(
                "reconnection_delay_grow_factor must be a finite number greater than 1, got {factor}"
            )));
        }
        Ok(())
    }

    /// Returns the configured factory, or the built-in one when the
    /// `tungstenite` feature is enabled.
    pub(crate) fn resolve_factory(&self) -> Result<TransportFactory, ReconnectError> {
        match &self.factory {
            Some(factory) => Ok(Arc::clone(factory)),
            None => default_factory().ok_or(ReconnectError::MissingFactory),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig::builder().build()
    }
}

#[cfg(feature = "tungstenite")]
fn default_factory() -> Option<TransportFactory> {
    Some(crate::tungstenite::TungsteniteTransport::factory())
}

#[cfg(not(feature = "tungstenite"))]
fn default_factory() -> Option<TransportFactory> {
    None
}

/// Builder for constructing a [`ReconnectConfig`].
#[derive(Default)]
pub struct ReconnectConfigBuilder {
    options: ReconnectOptions,
    // Durations set through the builder keep full precision; they take
    // precedence over the millisecond fields until `options` overrides them.
    min_delay: Option<Duration>,
    max_delay: Option<Duration>,
    connection_timeout: Option<Duration>,
    factory: Option<TransportFactory>,
    scheduler: Option<Arc<dyn Scheduler>>,
    observers: Observers<ReconnectEvent>,
}

impl std::fmt::Debug for ReconnectConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfigBuilder")
            .field("options", &self.options)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .field("connection_timeout", &self.connection_timeout)
            .field("factory", &self.factory.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ReconnectConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlays a set of options. Fields that are `None` leave earlier
    /// settings untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use resocket::{ReconnectConfig, ReconnectOptions};
    ///
    /// let options = ReconnectOptions {
    ///     max_retries: Some(0),
    ///     ..Default::default()
    /// };
    /// let config = ReconnectConfig::builder().options(options).build();
    /// assert_eq!(config.max_retries(), Some(0));
    /// ```
    pub fn options(mut self, options: ReconnectOptions) -> Self {
        if options.min_reconnection_delay_ms.is_some() {
            self.min_delay = None;
        }
        if options.max_reconnection_delay_ms.is_some() {
            self.max_delay = None;
        }
        if options.connection_timeout_ms.is_some() {
            self.connection_timeout = None;
        }
        self.options.merge(options);
        self
    }

    /// Sets the factory producing underlying connections.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<SharedTransport, TransportError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Sets a shared factory.
    pub fn shared_factory(mut self, factory: TransportFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the scheduler used for retry and timeout timers.
    ///
    /// Defaults to a [`TokioScheduler`](crate::TokioScheduler) on the runtime
    /// the socket is created in.
    pub fn scheduler<S>(mut self, scheduler: S) -> Self
    where
        S: Scheduler + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Sets the delay ceiling. Default: 10 seconds.
    pub fn max_reconnection_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Sets the base delay. Default: 1.5 seconds.
    pub fn min_reconnection_delay(mut self, delay: Duration) -> Self {
        self.min_delay = Some(delay);
        self
    }

    /// Sets the growth factor applied between retries. Default: 1.3.
    pub fn reconnection_delay_grow_factor(mut self, factor: f64) -> Self {
        self.options.reconnection_delay_grow_factor = Some(factor);
        self
    }

    /// Sets the connection timeout. Default: 4 seconds.
    ///
    /// The timeout is only acted on when
    /// [`enforce_connection_timeout`](Self::enforce_connection_timeout) is set.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Aborts and retries attempts that have not opened within the connection
    /// timeout. Default: `false`.
    pub fn enforce_connection_timeout(mut self, enforce: bool) -> Self {
        self.options.enforce_connection_timeout = Some(enforce);
        self
    }

    /// Sets the number of consecutive failed attempts tolerated before the
    /// socket gives up.
    ///
    /// # Examples
    ///
    /// ```
    /// use resocket::ReconnectConfig;
    ///
    /// let config = ReconnectConfig::builder().max_retries(5).build();
    /// assert_eq!(config.max_retries(), Some(5));
    /// ```
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = Some(max_retries);
        self
    }

    /// Retries forever. This is the default.
    pub fn unlimited_retries(mut self) -> Self {
        self.options.max_retries = None;
        self
    }

    /// Enables debug logging of lifecycle transitions.
    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = Some(debug);
        self
    }

    /// Names the socket in events, logs and metrics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Registers a callback for every lifecycle event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ReconnectEvent) + Send + Sync + 'static,
    {
        self.observers.add(FnObserver::new(f));
        self
    }

    /// Registers a callback invoked when an underlying connection opens.
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers
            .add(FnObserver::new(move |event: &ReconnectEvent| {
                if let ReconnectEvent::Opened { .. } = event {
                    f();
                }
            }));
        self
    }

    /// Registers a callback invoked when an underlying connection closes.
    ///
    /// The callback receives the close code and the retry count.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<u16>, u32) + Send + Sync + 'static,
    {
        self.observers
            .add(FnObserver::new(move |event: &ReconnectEvent| {
                if let ReconnectEvent::Closed {
                    code, retry_count, ..
                } = event
                {
                    f(*code, *retry_count);
                }
            }));
        self
    }

    /// Registers a callback invoked whenever a reconnect is scheduled.
    ///
    /// # Examples
    ///
    /// ```
    /// use resocket::ReconnectConfig;
    ///
    /// let config = ReconnectConfig::builder()
    ///     .on_retry_scheduled(|retry, delay| {
    ///         println!("retry {} in {:?}", retry, delay);
    ///     })
    ///     .build();
    /// ```
    pub fn on_retry_scheduled<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.observers
            .add(FnObserver::new(move |event: &ReconnectEvent| {
                if let ReconnectEvent::RetryScheduled {
                    retry_count, delay, ..
                } = event
                {
                    f(*retry_count, *delay);
                }
            }));
        self
    }

    /// Registers a callback invoked once the retry budget is exhausted.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&ReconnectError) + Send + Sync + 'static,
    {
        self.observers
            .add(FnObserver::new(move |event: &ReconnectEvent| {
                if let ReconnectEvent::RetryBudgetExceeded {
                    attempts,
                    max_retries,
                    ..
                } = event
                {
                    f(&ReconnectError::RetryBudgetExceeded {
                        attempts: *attempts,
                        max_retries: *max_retries,
                    });
                }
            }));
        self
    }

    /// Builds the configuration, filling every unset option with its default.
    pub fn build(self) -> ReconnectConfig {
        let options = self.options;
        let policy = BackoffPolicy::new(
            resolve_duration(
                self.min_delay,
                options.min_reconnection_delay_ms,
                DEFAULT_MIN_RECONNECTION_DELAY,
            ),
            resolve_duration(
                self.max_delay,
                options.max_reconnection_delay_ms,
                DEFAULT_MAX_RECONNECTION_DELAY,
            ),
            options
                .reconnection_delay_grow_factor
                .unwrap_or(DEFAULT_GROW_FACTOR),
        );

        ReconnectConfig {
            factory: self.factory,
            scheduler: self.scheduler,
            policy,
            connection_timeout: resolve_duration(
                self.connection_timeout,
                options.connection_timeout_ms,
                DEFAULT_CONNECTION_TIMEOUT,
            ),
            enforce_connection_timeout: options.enforce_connection_timeout.unwrap_or(false),
            max_retries: options.max_retries,
            debug: options.debug.unwrap_or(false),
            name: options.name.unwrap_or_else(|| String::from("<unnamed>")),
            observers: self.observers,
        }
    }
}

fn resolve_duration(exact: Option<Duration>, millis: Option<u64>, default: Duration) -> Duration {
    exact
        .or_else(|| millis.map(Duration::from_millis))
        .unwrap_or(default)
}
