//! Lifecycle observers.
//!
//! Every resocket component reports what it is doing (connecting, opening,
//! scheduling a retry, giving up) through a [`LifecycleEvent`]. Observers are
//! registered up front, usually through a config builder, and are called
//! synchronously in registration order.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events describing a socket's lifecycle.
pub trait LifecycleEvent: Send + Sync + fmt::Debug {
    /// Returns the kind of event (e.g., "opened", "retry_scheduled").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the socket that emitted this event.
    fn socket_name(&self) -> &str;
}

/// Trait for observing lifecycle events.
pub trait LifecycleObserver<E: LifecycleEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Type alias for shared observers.
pub type SharedObserver<E> = Arc<dyn LifecycleObserver<E>>;

/// An ordered collection of observers.
#[derive(Clone)]
pub struct Observers<E: LifecycleEvent> {
    observers: Vec<SharedObserver<E>>,
}

impl<E: LifecycleEvent> Observers<E> {
    /// Creates a new empty observer collection.
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Adds an observer to the collection.
    pub fn add<O>(&mut self, observer: O)
    where
        O: LifecycleObserver<E> + 'static,
    {
        self.observers.push(Arc::new(observer));
    }

    /// Emits an event to all registered observers.
    ///
    /// A panicking observer is isolated: the panic is caught and the remaining
    /// observers still see the event.
    pub fn emit(&self, event: &E) {
        for observer in &self.observers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer.on_event(event);
            }));

            #[cfg(feature = "tracing")]
            if outcome.is_err() {
                tracing::warn!(
                    socket = event.socket_name(),
                    event = event.event_type(),
                    "lifecycle observer panicked"
                );
            }
            #[cfg(not(feature = "tracing"))]
            let _ = outcome;
        }
    }

    /// Returns true if there are no observers.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Returns the number of observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }
}

impl<E: LifecycleEvent> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: LifecycleEvent> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.observers.len())
            .finish()
    }
}

/// A closure-backed observer.
pub struct FnObserver<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnObserver<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Creates a new closure-backed observer.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> LifecycleObserver<E> for FnObserver<E, F>
where
    E: LifecycleEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
