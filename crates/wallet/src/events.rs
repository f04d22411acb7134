//! Typed provider events.

use headless_wallet_rpc::error::RpcError;
use parking_lot::Mutex;
use serde::Serialize;
use std::{fmt, hash::Hash, str::FromStr, sync::Arc};

/// An event type with a discriminant listeners register for.
pub trait WalletEvent: Clone + Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Identifies a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E: WalletEvent> {
    id: ListenerId,
    kind: E::Kind,
    once: bool,
    handler: Handler<E>,
}

struct Listeners<E: WalletEvent> {
    next_id: u64,
    entries: Vec<Entry<E>>,
}

/// Dispatches events to listeners in registration order.
///
/// Handlers run outside the internal lock and may add or remove listeners.
pub struct EventEmitter<E: WalletEvent> {
    listeners: Arc<Mutex<Listeners<E>>>,
}

impl<E: WalletEvent> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self { listeners: Arc::clone(&self.listeners) }
    }
}

impl<E: WalletEvent> Default for EventEmitter<E> {
    fn default() -> Self {
        Self { listeners: Arc::new(Mutex::new(Listeners { next_id: 0, entries: Vec::new() })) }
    }
}

impl<E: WalletEvent> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter").field("listeners", &self.listener_count(None)).finish()
    }
}

impl<E: WalletEvent> EventEmitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: E::Kind, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(kind, false, Arc::new(handler))
    }

    /// Registers a handler that is removed before its first invocation.
    pub fn once<F>(&self, kind: E::Kind, handler: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.add(kind, true, Arc::new(handler))
    }

    fn add(&self, kind: E::Kind, once: bool, handler: Handler<E>) -> ListenerId {
        let mut listeners = self.listeners.lock();
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners.entries.push(Entry { id, kind, once, handler });
        id
    }

    /// Returns whether a listener was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.entries.len();
        listeners.entries.retain(|entry| entry.id != id);
        listeners.entries.len() != before
    }

    /// Removes all listeners for `kind`, or every listener if `None`.
    pub fn remove_all_listeners(&self, kind: Option<E::Kind>) {
        let mut listeners = self.listeners.lock();
        match kind {
            Some(kind) => listeners.entries.retain(|entry| entry.kind != kind),
            None => listeners.entries.clear(),
        }
    }

    pub fn listener_count(&self, kind: Option<E::Kind>) -> usize {
        let listeners = self.listeners.lock();
        listeners.entries.iter().filter(|entry| kind.is_none_or(|kind| entry.kind == kind)).count()
    }

    /// Calls every listener registered for the event's kind, returns how many ran.
    pub fn emit(&self, event: &E) -> usize {
        let kind = event.kind();
        let handlers: Vec<_> = {
            let mut listeners = self.listeners.lock();
            let handlers = listeners
                .entries
                .iter()
                .filter(|entry| entry.kind == kind)
                .map(|entry| Arc::clone(&entry.handler))
                .collect();
            listeners.entries.retain(|entry| !(entry.once && entry.kind == kind));
            handlers
        };
        trace!(target: "wallet::events", ?kind, listeners = handlers.len(), "emitting event");
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

/// EIP-1193 provider events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum EvmEvent {
    Connect {
        #[serde(rename = "chainId")]
        chain_id: String,
    },
    Disconnect(RpcError),
    AccountsChanged(Vec<String>),
    ChainChanged(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EvmEventKind {
    Connect,
    Disconnect,
    AccountsChanged,
    ChainChanged,
}

impl EvmEventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::AccountsChanged => "accountsChanged",
            Self::ChainChanged => "chainChanged",
        }
    }
}

impl fmt::Display for EvmEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvmEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "accountsChanged" => Self::AccountsChanged,
            "chainChanged" => Self::ChainChanged,
            other => return Err(format!("unknown event `{other}`")),
        })
    }
}

impl WalletEvent for EvmEvent {
    type Kind = EvmEventKind;

    fn kind(&self) -> EvmEventKind {
        match self {
            Self::Connect { .. } => EvmEventKind::Connect,
            Self::Disconnect(_) => EvmEventKind::Disconnect,
            Self::AccountsChanged(_) => EvmEventKind::AccountsChanged,
            Self::ChainChanged(_) => EvmEventKind::ChainChanged,
        }
    }
}

/// Wallet Standard `standard:events` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolanaEvent {
    Change {
        #[serde(skip_serializing_if = "Option::is_none")]
        accounts: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        chains: Option<Vec<String>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SolanaEventKind {
    Change,
}

impl WalletEvent for SolanaEvent {
    type Kind = SolanaEventKind;

    fn kind(&self) -> SolanaEventKind {
        match self {
            Self::Change { .. } => SolanaEventKind::Change,
        }
    }
}
