//! Driver side of the bridge.

use crate::{
    error::BridgeError,
    message::{BridgeMessage, BridgeResponse, MessageType, SecurityCheckResult, now_millis},
    rate_limit::RateLimiter,
    session::{BridgeSession, SessionCredentials},
    transport::PageTransport,
};
use headless_wallet::{SecurityGuard, security::EnvironmentSnapshot};
use headless_wallet_config::{BridgeConfig, Config};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};

/// Lifecycle of a [`MessageBridge`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// Constructed, the page side isn't injected yet.
    Created,
    /// Injected and accepting messages.
    Ready,
    /// Cleaned up. Terminal.
    Closed,
}

/// Sends commands into one page and correlates the replies.
///
/// Every call either resolves with the page's reply or fails with a [`BridgeError`], and its
/// pending entry is gone once the call returns.
pub struct MessageBridge {
    session: Arc<BridgeSession>,
    transport: Arc<dyn PageTransport>,
    config: BridgeConfig,
    limiter: RateLimiter,
    state: Mutex<BridgeState>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl MessageBridge {
    /// Creates a bridge with fresh session credentials.
    ///
    /// Fails if `environment` looks like production, before anything touches the page.
    pub fn new(
        transport: Arc<dyn PageTransport>,
        config: &Config,
        environment: &EnvironmentSnapshot,
    ) -> Result<Self, BridgeError> {
        SecurityGuard::new(&config.security).ensure_not_production(environment)?;
        Ok(Self {
            session: Arc::new(BridgeSession::new(SessionCredentials::random())),
            transport,
            config: config.bridge.clone(),
            limiter: RateLimiter::new(&config.bridge.rate_limit),
            state: Mutex::new(BridgeState::Created),
            reader: Mutex::new(None),
        })
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    pub fn state(&self) -> BridgeState {
        *self.state.lock()
    }

    pub fn transport(&self) -> &Arc<dyn PageTransport> {
        &self.transport
    }

    pub fn pending_count(&self) -> usize {
        self.session.pending_count()
    }

    pub fn message_count(&self) -> u64 {
        self.session.message_count()
    }

    /// Starts reading replies, injects the page side and, if `handshake` is set, verifies that
    /// the page answers for this session. Calling it on a ready bridge is a no-op.
    pub async fn initialize(&self, handshake: bool) -> Result<(), BridgeError> {
        match self.state() {
            BridgeState::Ready => return Ok(()),
            BridgeState::Closed => return Err(BridgeError::Closed),
            BridgeState::Created => {}
        }
        let replies = self
            .transport
            .take_replies()
            .ok_or_else(|| BridgeError::Handshake("reply stream already taken".to_string()))?;
        *self.reader.lock() = Some(tokio::spawn(read_replies(Arc::clone(&self.session), replies)));

        if let Err(err) = self.transport.inject(self.session.credentials()).await {
            self.shutdown_reader();
            *self.state.lock() = BridgeState::Closed;
            return Err(err);
        }
        *self.state.lock() = BridgeState::Ready;

        if handshake && let Err(err) = self.handshake().await {
            warn!(target: "bridge", session = %self.session_id(), %err, "handshake failed");
            self.cleanup().await;
            return Err(match err {
                err @ BridgeError::Handshake(_) => err,
                err if err.code() == "SECURITY_VIOLATION" => err,
                err => BridgeError::Handshake(err.to_string()),
            });
        }
        debug!(target: "bridge", session = %self.session_id(), page = %self.transport.page_id(), "bridge ready");
        Ok(())
    }

    async fn handshake(&self) -> Result<(), BridgeError> {
        let value =
            self.round_trip(MessageType::SecurityCheck, json!({}), self.config.handshake_timeout()).await?;
        let result: SecurityCheckResult = serde_json::from_value(value)?;
        if result.session_id != self.session_id() {
            return Err(BridgeError::Handshake("page answered for a different session".to_string()));
        }
        Ok(())
    }

    /// Sends a command and waits for its reply.
    pub async fn send<P, R>(&self, message_type: MessageType, payload: &P) -> Result<R, BridgeError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        match self.state() {
            BridgeState::Created => return Err(BridgeError::NotInitialized),
            BridgeState::Closed => return Err(BridgeError::Closed),
            BridgeState::Ready => {}
        }
        let (id, raw) = self.envelope(message_type, serde_json::to_value(payload)?)?;
        // sized before the limiter so oversized messages keep the budget
        self.limiter
            .check(self.session_id(), message_type)
            .map_err(|retry_after| BridgeError::RateLimited { message_type, retry_after })?;
        let value = self.exchange(id, message_type, raw, self.config.message_timeout()).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn round_trip(
        &self,
        message_type: MessageType,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let (id, raw) = self.envelope(message_type, payload)?;
        self.exchange(id, message_type, raw, timeout).await
    }

    /// Wraps `payload` for this session and enforces the size limit. Returns the message id and
    /// the serialized message.
    fn envelope(
        &self,
        message_type: MessageType,
        payload: Value,
    ) -> Result<(String, String), BridgeError> {
        let credentials = self.session.credentials();
        let message = BridgeMessage {
            id: self.session.next_id(),
            message_type,
            payload,
            timestamp: now_millis(),
            session_id: credentials.session_id.clone(),
            security_token: credentials.security_token.clone(),
        };
        let raw = serde_json::to_string(&message)?;
        if raw.len() > self.config.max_message_size {
            return Err(BridgeError::MessageTooLarge {
                size: raw.len(),
                limit: self.config.max_message_size,
            });
        }
        Ok((message.id, raw))
    }

    async fn exchange(
        &self,
        id: String,
        message_type: MessageType,
        raw: String,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let reply = self.session.register(id.clone(), message_type);
        trace!(target: "bridge", %id, %message_type, "sending");
        if let Err(err) = self.transport.post(raw).await {
            self.session.remove(&id);
            return Err(err);
        }
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(reply)) => reply,
            // the entry was dropped without an answer
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.session.remove(&id);
                warn!(target: "bridge", %id, %message_type, ?timeout, "message timed out");
                Err(BridgeError::Timeout { message_type, timeout })
            }
        }
    }

    /// Round trip time of a `heartbeat`.
    pub async fn heartbeat(&self) -> Result<Duration, BridgeError> {
        let started = Instant::now();
        let _: Value = self.send(MessageType::Heartbeat, &json!({})).await?;
        Ok(started.elapsed())
    }

    /// Rejects every pending call, asks the page to drop its wallets and stops reading replies.
    ///
    /// Safe to call more than once.
    pub async fn cleanup(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), BridgeState::Closed);
        if previous == BridgeState::Closed {
            return;
        }
        let rejected = self.session.reject_all(|_| BridgeError::Closed);
        if previous == BridgeState::Ready {
            let timeout = self.config.handshake_timeout();
            if let Err(err) = self.round_trip(MessageType::CleanupAll, json!({}), timeout).await {
                debug!(target: "bridge", %err, "page cleanup failed");
            }
        }
        self.session.reject_all(|_| BridgeError::Closed);
        self.shutdown_reader();
        self.limiter.reset(self.session_id());
        debug!(target: "bridge", session = %self.session_id(), rejected, "bridge cleaned up");
    }

    fn shutdown_reader(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

async fn read_replies(
    session: Arc<BridgeSession>,
    mut replies: tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    while let Some(raw) = replies.recv().await {
        let response = match serde_json::from_str::<BridgeResponse>(&raw) {
            Ok(response) => response,
            Err(err) => {
                warn!(target: "bridge", %err, "dropping unreadable reply");
                continue;
            }
        };
        let id = response.id.clone();
        let reply = response.into_result().map_err(BridgeError::from);
        if !session.resolve(&id, reply) {
            warn!(target: "bridge", %id, "dropping reply without a pending message");
        }
    }
    let rejected = session.reject_all(|_| BridgeError::Closed);
    debug!(target: "bridge", rejected, "reply stream ended");
}

impl Drop for MessageBridge {
    fn drop(&mut self) {
        self.shutdown_reader();
    }
}

impl fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBridge")
            .field("session", &self.session_id())
            .field("page", &self.transport.page_id())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
