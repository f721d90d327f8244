//! Durable record of caller subscriptions.
//!
//! Underlying connections come and go; the registry does not. Every
//! subscription made through the socket is recorded here before it is applied
//! to the current connection, and the full record is replayed onto each
//! replacement connection.

use resocket_core::{Listener, ListenerOptions, Transport};
use std::sync::Arc;

struct Subscription {
    listener: Listener,
    options: ListenerOptions,
}

/// Subscriptions grouped by event type, both in first-subscription order.
#[derive(Default)]
pub struct ListenerRegistry {
    by_type: Vec<(String, Vec<Subscription>)>,
}

/// A snapshot of the registry, taken under lock and replayed outside it.
pub(crate) type Replay = Vec<(String, Listener, ListenerOptions)>;

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. A listener already recorded for `kind` is not
    /// recorded twice; returns false in that case.
    pub fn record(&mut self, kind: &str, listener: Listener, options: ListenerOptions) -> bool {
        let index = match self.by_type.iter().position(|(k, _)| k == kind) {
            Some(index) => index,
            None => {
                self.by_type.push((kind.to_string(), Vec::new()));
                self.by_type.len() - 1
            }
        };

        let subscriptions = &mut self.by_type[index].1;
        if subscriptions
            .iter()
            .any(|sub| Arc::ptr_eq(&sub.listener, &listener))
        {
            return false;
        }
        subscriptions.push(Subscription { listener, options });
        true
    }

    /// Forgets a subscription. Returns false if it was never recorded.
    pub fn forget(&mut self, kind: &str, listener: &Listener) -> bool {
        let Some((_, subscriptions)) = self.by_type.iter_mut().find(|(k, _)| k == kind) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|sub| !Arc::ptr_eq(&sub.listener, listener));
        before != subscriptions.len()
    }

    /// Returns true if `listener` is recorded for `kind`.
    pub fn contains(&self, kind: &str, listener: &Listener) -> bool {
        self.by_type
            .iter()
            .filter(|(k, _)| k == kind)
            .flat_map(|(_, subs)| subs.iter())
            .any(|sub| Arc::ptr_eq(&sub.listener, listener))
    }

    /// Returns the number of recorded subscriptions for `kind`.
    pub fn count(&self, kind: &str) -> usize {
        self.by_type
            .iter()
            .find(|(k, _)| k == kind)
            .map_or(0, |(_, subs)| subs.len())
    }

    /// Returns the total number of recorded subscriptions.
    pub fn len(&self) -> usize {
        self.by_type.iter().map(|(_, subs)| subs.len()).sum()
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn snapshot(&self) -> Replay {
        self.by_type
            .iter()
            .flat_map(|(kind, subs)| {
                subs.iter()
                    .map(move |sub| (kind.clone(), sub.listener.clone(), sub.options))
            })
            .collect()
    }

    /// Entries of `snapshot` that are no longer recorded.
    pub(crate) fn forgotten_since(&self, snapshot: &Replay) -> Replay {
        snapshot
            .iter()
            .filter(|(kind, listener, _)| !self.contains(kind, listener))
            .cloned()
            .collect()
    }
}

/// Applies every entry of `snapshot` to `transport`, in order.
pub(crate) fn replay(snapshot: &Replay, transport: &dyn Transport) {
    for (kind, listener, options) in snapshot {
        transport.add_event_listener(kind, Arc::clone(listener), *options);
    }
}

/// Detaches entries from `transport`; undoes a replay of subscriptions that
/// were forgotten while it ran.
pub(crate) fn detach(entries: &Replay, transport: &dyn Transport) {
    for (kind, listener, options) in entries {
        transport.remove_event_listener(kind, listener, *options);
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.by_type.iter().map(|(kind, subs)| (kind, subs.len())))
            .finish()
    }
}
