//! Session credentials and the pending reply map.

use crate::{error::BridgeError, message::MessageType};
use headless_wallet::security::{constant_time_eq, random_hex};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::oneshot;

/// The credentials every message of a session carries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub session_id: String,
    pub security_token: String,
}

impl SessionCredentials {
    /// Fresh random credentials: a 16 byte session id and a 32 byte token, both hex encoded.
    pub fn random() -> Self {
        Self { session_id: random_hex(16), security_token: random_hex(32) }
    }

    /// Whether `session_id` and `token` match these credentials.
    pub fn matches(&self, session_id: &str, token: &str) -> bool {
        // no short circuit
        let session = constant_time_eq(self.session_id.as_bytes(), session_id.as_bytes());
        let token = constant_time_eq(self.security_token.as_bytes(), token.as_bytes());
        session & token
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("session_id", &self.session_id)
            .field("security_token", &"<redacted>")
            .finish()
    }
}

pub(crate) type Reply = Result<Value, BridgeError>;

#[derive(Debug)]
struct Pending {
    message_type: MessageType,
    sender: oneshot::Sender<Reply>,
}

/// A bridge session: credentials, the message counter and the replies still awaited.
///
/// Every pending entry is completed at most once: [`BridgeSession::resolve`],
/// [`BridgeSession::remove`] and [`BridgeSession::reject_all`] all take the entry out of the map
/// before completing it.
#[derive(Debug)]
pub struct BridgeSession {
    credentials: SessionCredentials,
    counter: AtomicU64,
    pending: Mutex<HashMap<String, Pending>>,
}

impl BridgeSession {
    pub fn new(credentials: SessionCredentials) -> Self {
        Self { credentials, counter: AtomicU64::new(0), pending: Default::default() }
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn session_id(&self) -> &str {
        &self.credentials.session_id
    }

    /// Next message id. Ids are never reused within a session, so a reply that arrives after its
    /// entry timed out can't be mistaken for the reply to a newer message.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", &self.credentials.session_id[..8.min(self.credentials.session_id.len())])
    }

    pub fn message_count(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    pub(crate) fn register(&self, id: String, message_type: MessageType) -> oneshot::Receiver<Reply> {
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(id, Pending { message_type, sender });
        receiver
    }

    /// Completes the entry of `id`. Returns `false` for ids that aren't pending.
    pub(crate) fn resolve(&self, id: &str, reply: Reply) -> bool {
        let Some(pending) = self.pending.lock().remove(id) else {
            return false;
        };
        trace!(target: "bridge::session", %id, message_type = %pending.message_type, "resolved");
        // the caller may have stopped waiting already
        let _ = pending.sender.send(reply);
        true
    }

    /// Drops the entry of `id` without completing it.
    pub(crate) fn remove(&self, id: &str) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Rejects every pending entry with the error `f` builds. Returns the number of entries.
    pub(crate) fn reject_all(&self, f: impl Fn(MessageType) -> BridgeError) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (_, pending) in drained {
            let _ = pending.sender.send(Err(f(pending.message_type)));
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
