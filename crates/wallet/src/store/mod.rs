//! Observable key/value store.
//!
//! Listeners always run after the store lock was released, so a listener may read or mutate the
//! store it's subscribed to.

use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::{Arc, Weak},
};

mod derived;
pub use derived::Derived;

/// Number of history entries kept by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// A single changed key.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange<K, V> {
    pub key: K,
    pub previous: Option<V>,
    pub current: V,
}

/// Everything a `subscribe_all` listener receives for one `set` or `batch_set`.
#[derive(Clone, Debug)]
pub struct StoreNotification<K, V> {
    /// One entry per changed key, in the order the keys were written.
    pub changes: Vec<StoreChange<K, V>>,
    /// All values after the update was applied.
    pub snapshot: BTreeMap<K, V>,
}

/// Recorded update, one per effective `set` or `batch_set`.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry<K, V> {
    pub sequence: u64,
    pub changes: Vec<StoreChange<K, V>>,
}

type KeyListener<K, V> = Arc<dyn Fn(&StoreChange<K, V>) + Send + Sync>;
type AllListener<K, V> = Arc<dyn Fn(&StoreNotification<K, V>) + Send + Sync>;

struct Inner<K, V> {
    values: BTreeMap<K, V>,
    history: VecDeque<HistoryEntry<K, V>>,
    history_limit: usize,
    sequence: u64,
    next_listener_id: u64,
    key_listeners: BTreeMap<K, Vec<(u64, KeyListener<K, V>)>>,
    all_listeners: Vec<(u64, AllListener<K, V>)>,
}

impl<K: Ord, V> Inner<K, V> {
    fn next_id(&mut self) -> u64 {
        self.next_listener_id += 1;
        self.next_listener_id
    }

    fn remove_listener(&mut self, id: u64) {
        for listeners in self.key_listeners.values_mut() {
            listeners.retain(|(listener_id, _)| *listener_id != id);
        }
        self.key_listeners.retain(|_, listeners| !listeners.is_empty());
        self.all_listeners.retain(|(listener_id, _)| *listener_id != id);
    }
}

/// A keyed store that notifies subscribers when values change.
///
/// Writing a value equal to the current one is a no-op: nothing is notified and nothing is
/// recorded. Cloning yields another handle to the same store.
pub struct ObservableStore<K, V> {
    inner: Arc<Mutex<Inner<K, V>>>,
}

impl<K, V> Clone for ObservableStore<K, V> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, V> fmt::Debug for ObservableStore<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ObservableStore")
            .field("values", &inner.values)
            .field("history", &inner.history.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> Default for ObservableStore<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl<K, V> ObservableStore<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(initial: BTreeMap<K, V>) -> Self {
        Self::with_history_limit(initial, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(initial: BTreeMap<K, V>, history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                values: initial,
                history: VecDeque::new(),
                history_limit,
                sequence: 0,
                next_listener_id: 0,
                key_listeners: BTreeMap::new(),
                all_listeners: Vec::new(),
            })),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().values.get(key).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.inner.lock().values.clone()
    }

    /// Sets a single key, returns whether the value changed.
    pub fn set(&self, key: K, value: V) -> bool {
        !self.batch_set([(key, value)]).is_empty()
    }

    /// Applies all updates atomically and notifies once.
    ///
    /// Key listeners get one call per changed key, `subscribe_all` listeners get a single
    /// notification carrying every change.
    pub fn batch_set(&self, updates: impl IntoIterator<Item = (K, V)>) -> Vec<StoreChange<K, V>> {
        let (changes, key_listeners, all_listeners, snapshot) = {
            let mut inner = self.inner.lock();
            let mut changes: Vec<StoreChange<K, V>> = Vec::new();
            for (key, value) in updates {
                if inner.values.get(&key) == Some(&value) {
                    continue;
                }
                let previous = inner.values.insert(key.clone(), value.clone());
                // a key written twice in one batch collapses into a single change
                if let Some(existing) = changes.iter_mut().find(|change| change.key == key) {
                    existing.current = value;
                } else {
                    changes.push(StoreChange { key, previous, current: value });
                }
            }
            changes.retain(|change| change.previous.as_ref() != Some(&change.current));
            if changes.is_empty() {
                return changes;
            }

            inner.sequence += 1;
            let entry = HistoryEntry { sequence: inner.sequence, changes: changes.clone() };
            inner.history.push_back(entry);
            while inner.history.len() > inner.history_limit {
                inner.history.pop_front();
            }

            let key_listeners: Vec<_> = changes
                .iter()
                .enumerate()
                .flat_map(|(idx, change)| {
                    inner
                        .key_listeners
                        .get(&change.key)
                        .into_iter()
                        .flatten()
                        .map(move |(_, listener)| (idx, Arc::clone(listener)))
                })
                .collect();
            let all_listeners: Vec<_> =
                inner.all_listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect();
            let snapshot = (!all_listeners.is_empty()).then(|| inner.values.clone());
            (changes, key_listeners, all_listeners, snapshot)
        };

        for (idx, listener) in key_listeners {
            listener(&changes[idx]);
        }
        if let Some(snapshot) = snapshot {
            let notification = StoreNotification { changes: changes.clone(), snapshot };
            for listener in all_listeners {
                listener(&notification);
            }
        }
        changes
    }

    /// Calls `listener` whenever `key` changes.
    pub fn subscribe<F>(&self, key: K, listener: F) -> Subscription
    where
        F: Fn(&StoreChange<K, V>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        inner.key_listeners.entry(key).or_default().push((id, Arc::new(listener)));
        self.subscription(id)
    }

    /// Calls `listener` once per effective update with all of its changes.
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreNotification<K, V>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        inner.all_listeners.push((id, Arc::new(listener)));
        self.subscription(id)
    }

    fn subscription(&self, id: u64) -> Subscription {
        let inner: Weak<Mutex<Inner<K, V>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.lock().remove_listener(id);
            }
        })
    }

    /// The most recent updates, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry<K, V>> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.all_listeners.len() + inner.key_listeners.values().map(Vec::len).sum::<usize>()
    }

    /// Derives a value from the whole store.
    ///
    /// The derived value only notifies its own subscribers when `eq` reports a difference.
    pub fn derive<T, S, E>(&self, selector: S, eq: E) -> Derived<T>
    where
        T: Clone + Send + Sync + 'static,
        S: Fn(&BTreeMap<K, V>) -> T + Send + Sync + 'static,
        E: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Derived::new(self, selector, eq)
    }
}

/// Handle returned by the `subscribe` functions.
///
/// Dropping the handle keeps the listener registered, call [`Subscription::unsubscribe`] to
/// remove it.
#[must_use = "the subscription can only be cancelled through this handle"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Removes the listener. Calling this after the store was dropped is a no-op.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store() -> ObservableStore<&'static str, serde_json::Value> {
        ObservableStore::default()
    }

    #[test]
    fn set_is_noop_on_equal_values() {
        let store = store();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let _sub = store.subscribe("chainId", move |change| seen.lock().push(change.current.clone()));

        assert!(store.set("chainId", serde_json::json!("0x1")));
        assert!(!store.set("chainId", serde_json::json!("0x1")));
        assert!(store.set("chainId", serde_json::json!("0x89")));

        assert_eq!(*calls.lock(), vec![serde_json::json!("0x1"), serde_json::json!("0x89")]);
        assert_eq!(store.history().len(), 2);
    }

    #[test]
    fn deep_equality_of_collections() {
        let store: ObservableStore<u8, HashSet<String>> = ObservableStore::default();
        let a: HashSet<String> = ["eth_accounts", "wallet_watchAsset"].map(String::from).into();
        let b: HashSet<String> = ["wallet_watchAsset", "eth_accounts"].map(String::from).into();
        assert!(store.set(0, a));
        assert!(!store.set(0, b));
    }

    #[test]
    fn batch_notifies_once() {
        let store = store();
        let notifications = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&notifications);
        let _sub = store.subscribe_all(move |n| seen.lock().push(n.changes.len()));

        let changes = store.batch_set([
            ("accounts", serde_json::json!(["0xabc"])),
            ("isConnected", serde_json::json!(true)),
            ("accounts", serde_json::json!(["0xdef"])),
        ]);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].current, serde_json::json!(["0xdef"]));
        assert_eq!(*notifications.lock(), vec![2]);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let store = store();
        let count = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&count);
        let sub = store.subscribe("a", move |_| *seen.lock() += 1);
        store.set("a", serde_json::json!(1));
        sub.unsubscribe();
        store.set("a", serde_json::json!(2));
        assert_eq!(*count.lock(), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn listeners_may_write_to_the_store() {
        let store = store();
        let handle = store.clone();
        let _sub = store.subscribe("a", move |change| {
            handle.set("b", change.current.clone());
        });
        store.set("a", serde_json::json!(7));
        assert_eq!(store.get(&"b"), Some(serde_json::json!(7)));
    }

    #[test]
    fn history_is_bounded() {
        let store: ObservableStore<u8, u32> = ObservableStore::with_history_limit(BTreeMap::new(), 3);
        for i in 0..10 {
            store.set(0, i);
        }
        let history = store.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].sequence, 8);
        assert_eq!(history[2].changes[0].current, 9);
    }
}
