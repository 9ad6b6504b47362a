use std::sync::Arc;

use parking_lot::Mutex;

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct RegistryInner<E> {
    next_id: u64,
    observers: Vec<(u64, Callback<E>)>,
}

/// Event fan-out with scoped registration.
///
/// `subscribe` returns a [`Subscription`] guard; dropping it deregisters
/// the observer, so a component that goes away can never leak its callback
/// into later emissions.
pub struct ObserverRegistry<E> {
    inner: Arc<Mutex<RegistryInner<E>>>,
}

impl<E: 'static> Default for ObserverRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> ObserverRegistry<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.push((id, Arc::new(callback)));

        let registry = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.lock().observers.retain(|(i, _)| *i != id);
                }
            })),
        }
    }

    /// Invoke every live observer. Callbacks run outside the registry
    /// lock, so an observer may subscribe or drop subscriptions reentrantly.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = self
            .inner
            .lock()
            .observers
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

impl<E: 'static> Clone for ObserverRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// RAII registration handle; dropping it deregisters the observer.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Keep the observer registered for the registry's whole lifetime.
    pub fn detach(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_emit_reaches_subscriber() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        let _sub = registry.subscribe(move |value| {
            seen_clone.fetch_add(*value as usize, Ordering::SeqCst);
        });

        registry.emit(&3);
        registry.emit(&4);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_drop_deregisters() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        let sub = registry.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.observer_count(), 1);

        drop(sub);
        assert_eq!(registry.observer_count(), 0);

        registry.emit(&1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_detach_keeps_observer_alive() {
        let registry: ObserverRegistry<u32> = ObserverRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        registry
            .subscribe(move |_| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            })
            .detach();

        registry.emit(&1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_observers_all_notified() {
        let registry: ObserverRegistry<&str> = ObserverRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let subs: Vec<Subscription> = (0..3)
            .map(|_| {
                let count = count.clone();
                registry.subscribe(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        registry.emit(&"event");
        assert_eq!(count.load(Ordering::SeqCst), 3);
        drop(subs);
        assert_eq!(registry.observer_count(), 0);
    }
}
