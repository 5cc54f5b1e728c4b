use super::DispatcherHandle;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Observer = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    observers: Vec<(u64, Observer)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// A set of string observers (log lines, status text).
///
/// Registration hands back a [`Subscription`]; the observer stays registered
/// exactly as long as that guard lives.
#[derive(Clone, Default)]
pub struct ObserverSet {
    registry: Arc<Mutex<Registry>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` until the returned guard is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.observers.push((id, Arc::new(observer)));

        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every currently registered observer on this thread.
    ///
    /// Observers are snapshotted first, so an observer may subscribe or
    /// unsubscribe without deadlocking.
    pub fn notify(&self, message: &str) {
        let observers: Vec<Observer> = lock(&self.registry)
            .observers
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            observer(message);
        }
    }

    /// Queue a notification on the consumer thread of `dispatcher`.
    ///
    /// Observers are looked up when the dispatcher drains, not now: a
    /// subscription dropped in between is never called.
    pub fn dispatch(&self, dispatcher: &DispatcherHandle, message: impl Into<String>) -> bool {
        let observers = self.clone();
        let message = message.into();
        dispatcher.enqueue(move || observers.notify(&message))
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.len())
            .finish()
    }
}

/// Registration guard returned by [`ObserverSet::subscribe`].
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the observer.
#[must_use = "the observer is removed as soon as the subscription is dropped"]
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).observers.retain(|(id, _)| *id != self.id);
        }
    }
}
