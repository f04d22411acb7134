use super::{ObservableStore, Subscription};
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{Arc, Weak},
};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct DerivedInner<T> {
    value: T,
    next_listener_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// A value computed from an [`ObservableStore`], recomputed on every store update.
///
/// Dropping it detaches from the parent store.
pub struct Derived<T> {
    inner: Arc<Mutex<DerivedInner<T>>>,
    parent: Option<Subscription>,
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) fn new<K, V, S, E>(store: &ObservableStore<K, V>, selector: S, eq: E) -> Self
    where
        K: Ord + Clone + Send + Sync + 'static,
        V: Clone + PartialEq + Send + Sync + 'static,
        S: Fn(&std::collections::BTreeMap<K, V>) -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let inner = Arc::new(Mutex::new(DerivedInner {
            value: selector(&store.snapshot()),
            next_listener_id: 0,
            listeners: Vec::new(),
        }));
        let weak = Arc::downgrade(&inner);
        let parent = store.subscribe_all(move |notification| {
            let Some(inner) = weak.upgrade() else { return };
            let next = selector(&notification.snapshot);
            let listeners: Vec<_> = {
                let mut inner = inner.lock();
                if eq(&inner.value, &next) {
                    return;
                }
                inner.value = next.clone();
                inner.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
            };
            for listener in listeners {
                listener(&next);
            }
        });
        Self { inner, parent: Some(parent) }
    }

    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Calls `listener` with every new derived value.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.next_listener_id += 1;
        let id = inner.next_listener_id;
        inner.listeners.push((id, Arc::new(listener)));
        let weak: Weak<Mutex<DerivedInner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }
}

impl<T> Drop for Derived<T> {
    fn drop(&mut self) {
        if let Some(parent) = self.parent.take() {
            parent.unsubscribe();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived").field("value", &self.inner.lock().value).finish_non_exhaustive()
    }
}
