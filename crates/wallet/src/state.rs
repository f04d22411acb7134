//! Provider state on top of the observable store.

use crate::{
    chains::chain_id_to_decimal,
    store::{ObservableStore, StoreChange, Subscription},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StateKey {
    Accounts,
    ChainId,
    NetworkVersion,
    IsConnected,
    IsUnlocked,
    SelectedAddress,
    Permissions,
    PendingRequests,
}

/// A request waiting on the simulated user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: String,
    pub method: String,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    Accounts(Vec<String>),
    Text(Option<String>),
    Flag(bool),
    Permissions(HashSet<String>),
    Pending(HashMap<String, PendingRequest>),
}

/// Lifecycle transitions synthesized from `isConnected` changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Connected { chain_id: Option<String> },
    Disconnected,
}

/// What [`ProviderStateStore::subscribe`] listeners receive for one update.
#[derive(Clone, Debug, PartialEq)]
pub struct StateNotification {
    /// Set when `isConnected` flipped as part of this update.
    pub lifecycle: Option<Lifecycle>,
    pub changes: Vec<StoreChange<StateKey, StateValue>>,
}

impl StateNotification {
    pub fn changed(&self, key: StateKey) -> Option<&StateValue> {
        self.changes.iter().find(|change| change.key == key).map(|change| &change.current)
    }
}

/// Point in time copy of all provider state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    pub accounts: Vec<String>,
    pub chain_id: Option<String>,
    pub network_version: Option<String>,
    pub is_connected: bool,
    pub is_unlocked: bool,
    pub selected_address: Option<String>,
    /// Sorted for stable output.
    pub permissions: Vec<String>,
    pub pending_requests: Vec<PendingRequest>,
}

type Listener = Arc<dyn Fn(&StateNotification) + Send + Sync>;

/// Provider state with its invariants:
///
/// - `selectedAddress` is always one of `accounts`, or unset when `accounts` is empty
/// - `networkVersion` is the decimal form of `chainId`
/// - `accounts` is empty while disconnected
#[derive(Clone)]
pub struct ProviderStateStore {
    store: ObservableStore<StateKey, StateValue>,
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_listener_id: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for ProviderStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderStateStore").field("state", &self.snapshot()).finish_non_exhaustive()
    }
}

impl ProviderStateStore {
    pub fn new(chain_id: Option<String>) -> Self {
        let network_version = chain_id.as_deref().and_then(|id| chain_id_to_decimal(id).ok());
        let initial = BTreeMap::from([
            (StateKey::Accounts, StateValue::Accounts(Vec::new())),
            (StateKey::ChainId, StateValue::Text(chain_id)),
            (StateKey::NetworkVersion, StateValue::Text(network_version)),
            (StateKey::IsConnected, StateValue::Flag(false)),
            (StateKey::IsUnlocked, StateValue::Flag(true)),
            (StateKey::SelectedAddress, StateValue::Text(None)),
            (StateKey::Permissions, StateValue::Permissions(HashSet::new())),
            (StateKey::PendingRequests, StateValue::Pending(HashMap::new())),
        ]);
        Self {
            store: ObservableStore::new(initial),
            listeners: Default::default(),
            next_listener_id: Default::default(),
        }
    }

    /// The underlying store, for key subscriptions, derived values and history.
    pub fn store(&self) -> &ObservableStore<StateKey, StateValue> {
        &self.store
    }

    pub fn set(&self, key: StateKey, value: StateValue) -> StateNotification {
        self.batch_set([(key, value)])
    }

    /// Applies the updates together with the writes needed to keep the invariants, then
    /// notifies subscribers once.
    pub fn batch_set(
        &self,
        updates: impl IntoIterator<Item = (StateKey, StateValue)>,
    ) -> StateNotification {
        let mut updates: Vec<_> = updates.into_iter().collect();
        self.apply_invariants(&mut updates);

        let changes = self.store.batch_set(updates);
        let lifecycle = changes.iter().find(|change| change.key == StateKey::IsConnected).map(
            |change| match change.current {
                StateValue::Flag(true) => Lifecycle::Connected { chain_id: self.chain_id() },
                _ => Lifecycle::Disconnected,
            },
        );
        let notification = StateNotification { lifecycle, changes };
        if notification.changes.is_empty() {
            return notification;
        }

        let listeners: Vec<_> =
            self.listeners.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect();
        for listener in listeners {
            listener(&notification);
        }
        notification
    }

    fn apply_invariants(&self, updates: &mut Vec<(StateKey, StateValue)>) {
        let find = |updates: &Vec<(StateKey, StateValue)>, key| {
            updates.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        };

        if let Some(StateValue::Text(chain_id)) = find(updates, StateKey::ChainId) {
            let version = chain_id.as_deref().and_then(|id| chain_id_to_decimal(id).ok());
            updates.push((StateKey::NetworkVersion, StateValue::Text(version)));
        }

        if find(updates, StateKey::IsConnected) == Some(StateValue::Flag(false)) {
            updates.push((StateKey::Accounts, StateValue::Accounts(Vec::new())));
        }

        let accounts = match find(updates, StateKey::Accounts) {
            Some(StateValue::Accounts(accounts)) => Some(accounts),
            _ => None,
        };
        let selected = match find(updates, StateKey::SelectedAddress) {
            Some(StateValue::Text(selected)) => Some(selected),
            _ => None,
        };
        if accounts.is_none() && selected.is_none() {
            return;
        }
        let accounts = accounts.unwrap_or_else(|| self.accounts());
        let selected = selected.unwrap_or_else(|| self.selected_address());
        let selected = match selected {
            Some(address) if accounts.iter().any(|a| a.eq_ignore_ascii_case(&address)) => {
                Some(address)
            }
            _ => accounts.first().cloned(),
        };
        updates.push((StateKey::SelectedAddress, StateValue::Text(selected)));
    }

    /// Subscribes to state updates, `listener` runs once per effective update.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StateNotification) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_listener_id.lock();
            *next += 1;
            *next
        };
        self.listeners.lock().push((id, Arc::new(listener)));
        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    pub fn accounts(&self) -> Vec<String> {
        match self.store.get(&StateKey::Accounts) {
            Some(StateValue::Accounts(accounts)) => accounts,
            _ => Vec::new(),
        }
    }

    pub fn chain_id(&self) -> Option<String> {
        self.text(StateKey::ChainId)
    }

    pub fn network_version(&self) -> Option<String> {
        self.text(StateKey::NetworkVersion)
    }

    pub fn selected_address(&self) -> Option<String> {
        self.text(StateKey::SelectedAddress)
    }

    pub fn is_connected(&self) -> bool {
        self.flag(StateKey::IsConnected)
    }

    pub fn permissions(&self) -> HashSet<String> {
        match self.store.get(&StateKey::Permissions) {
            Some(StateValue::Permissions(permissions)) => permissions,
            _ => HashSet::new(),
        }
    }

    pub fn pending_requests(&self) -> HashMap<String, PendingRequest> {
        match self.store.get(&StateKey::PendingRequests) {
            Some(StateValue::Pending(pending)) => pending,
            _ => HashMap::new(),
        }
    }

    fn text(&self, key: StateKey) -> Option<String> {
        match self.store.get(&key) {
            Some(StateValue::Text(text)) => text,
            _ => None,
        }
    }

    fn flag(&self, key: StateKey) -> bool {
        matches!(self.store.get(&key), Some(StateValue::Flag(true)))
    }

    pub fn snapshot(&self) -> ProviderState {
        let mut permissions: Vec<_> = self.permissions().into_iter().collect();
        permissions.sort();
        let mut pending_requests: Vec<_> = self.pending_requests().into_values().collect();
        pending_requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ProviderState {
            accounts: self.accounts(),
            chain_id: self.chain_id(),
            network_version: self.network_version(),
            is_connected: self.is_connected(),
            is_unlocked: self.flag(StateKey::IsUnlocked),
            selected_address: self.selected_address(),
            permissions,
            pending_requests,
        }
    }
}
