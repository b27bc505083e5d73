//! Listener registry with scoped subscriptions.
//!
//! `on(..)` returns a [`Subscription`]; dropping it (or calling `dispose`)
//! removes the listener, so callbacks cannot outlive the session that
//! registered them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of event callbacks keyed by subscription id.
pub struct ListenerRegistry<E> {
    listeners: Arc<DashMap<u64, Listener<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: 'static> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays registered while the subscription lives.
    pub fn on(&self, f: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(f));

        let weak: Weak<DashMap<u64, Listener<E>>> = Arc::downgrade(&self.listeners);
        Subscription {
            dispose: Some(Box::new(move || {
                if let Some(map) = weak.upgrade() {
                    map.remove(&id);
                }
            })),
        }
    }

    /// Deliver `event` to every registered listener.
    pub fn emit(&self, event: &E) {
        // Snapshot first: a listener may dispose subscriptions while running.
        let snapshot: Vec<Listener<E>> = self.listeners.iter().map(|e| Arc::clone(e.value())).collect();
        for l in snapshot {
            l(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Handle that deregisters its listener on drop.
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Deregister now.
    pub fn dispose(mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.dispose.take() {
            f();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.dispose.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dropping_subscription_stops_delivery() {
        let reg = ListenerRegistry::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let sub = reg.on(move |n| {
            h.fetch_add(*n as usize, Ordering::SeqCst);
        });
        reg.emit(&2);
        assert_eq!(reg.len(), 1);

        drop(sub);
        reg.emit(&5);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let reg = ListenerRegistry::<()>::new();
        let sub = reg.on(|_| {});
        drop(reg);
        sub.dispose();
    }
}
