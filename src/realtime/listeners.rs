//! Event listener registry for the realtime channel.
//!
//! Listeners are invoked synchronously on the connection driver task, in
//! registration order. A listener that panics is isolated so its peers
//! still see the event.

use std::sync::Arc;

use crate::protocol::ServerEvent;

/// Callback invoked for every server event.
pub type Listener = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Handle returned by registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered set of event listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, keeping registration order for dispatch.
    pub fn add<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Arc::new(listener)));
        id
    }

    /// Deregister. Unknown ids are ignored.
    pub fn remove(&mut self, id: ListenerId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// Current listeners in registration order. Cloned out so dispatch does
    /// not hold the registry lock while callbacks run.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Listener> {
        self.entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Deliver one event to every listener in order, isolating panics.
pub fn dispatch(listeners: &[Listener], event: &ServerEvent) {
    for listener in listeners {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event))).is_err() {
            tracing::warn!(event = event.kind(), "event listener panicked");
        }
    }
}
