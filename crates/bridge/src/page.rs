//! An in-process page: a [`Window`] driven by a task that feeds posted messages to its
//! dispatcher.

use crate::{
    dispatcher::PageDispatcher, error::BridgeError, realm::Window, session::SessionCredentials,
    transport::PageTransport,
};
use async_trait::async_trait;
use headless_wallet::security::EnvironmentSnapshot;
use headless_wallet_config::Config;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use url::Url;
use uuid::Uuid;

/// A page living in the current process.
///
/// Messages posted before [`PageTransport::inject`] are dropped, the same way a page without the
/// bridge script ignores them.
#[derive(Debug)]
pub struct InProcessPage {
    id: String,
    context_id: String,
    window: Arc<Window>,
    config: Config,
    inbound: mpsc::UnboundedSender<String>,
    replies: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    unresponsive: Arc<AtomicBool>,
    closed: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InProcessPage {
    /// Opens a page at `url` in the browser context `context_id`.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(
        context_id: impl Into<String>,
        url: Url,
        environment: EnvironmentSnapshot,
        config: &Config,
    ) -> Arc<Self> {
        let window = Arc::new(Window::new(url, environment));
        let (inbound, mut inbound_rx) = mpsc::unbounded_channel::<String>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let unresponsive = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn({
            let window = Arc::clone(&window);
            let unresponsive = Arc::clone(&unresponsive);
            async move {
                while let Some(raw) = inbound_rx.recv().await {
                    if unresponsive.load(Ordering::Relaxed) {
                        trace!(target: "bridge::page", "page is unresponsive, dropping message");
                        continue;
                    }
                    let Some(dispatcher) = window.wallet_mock_bridge() else {
                        trace!(target: "bridge::page", "no bridge injected, dropping message");
                        continue;
                    };
                    let Some(response) = dispatcher.handle(&window, &raw) else { continue };
                    match serde_json::to_string(&response) {
                        Ok(reply) => {
                            if reply_tx.send(reply).is_err() {
                                break;
                            }
                        }
                        Err(err) => error!(target: "bridge::page", %err, "failed to encode reply"),
                    }
                }
            }
        });

        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            window,
            config: config.clone(),
            inbound,
            replies: Mutex::new(Some(reply_rx)),
            unresponsive,
            closed,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Makes the page silently drop every message, as a hung page would.
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.unresponsive.store(unresponsive, Ordering::Relaxed);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Closes the page: its wallets are torn down and every watcher is notified.
    pub fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        for (_, wallet) in self.window.drain_instances() {
            wallet.teardown(self.window.events());
        }
        self.window.set_bridge(None);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        debug!(target: "bridge::page", page = %self.id, "closed page");
    }
}

#[async_trait]
impl PageTransport for InProcessPage {
    fn page_id(&self) -> &str {
        &self.id
    }

    fn context_id(&self) -> &str {
        &self.context_id
    }

    async fn inject(&self, credentials: &SessionCredentials) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::transport("page is closed"));
        }
        let dispatcher = PageDispatcher::new(
            credentials.clone(),
            &self.config.security,
            self.config.wallet.clone(),
        );
        self.window.set_bridge(Some(Arc::new(dispatcher)));
        Ok(())
    }

    async fn post(&self, message: String) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::transport("page is closed"));
        }
        self.inbound.send(message).map_err(BridgeError::transport)
    }

    fn take_replies(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.replies.lock().take()
    }

    fn closed(&self) -> Option<watch::Receiver<bool>> {
        Some(self.closed.subscribe())
    }
}

impl Drop for InProcessPage {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BridgeResponse, MessageType};
    use serde_json::json;

    #[tokio::test]
    async fn drops_messages_until_injected() {
        let page = InProcessPage::open(
            "ctx",
            Url::parse("http://localhost:3000").unwrap(),
            EnvironmentSnapshot::default(),
            &Config::default(),
        );
        let mut replies = page.take_replies().unwrap();
        assert!(page.take_replies().is_none());

        let credentials = SessionCredentials::random();
        let message = |id: &str| {
            json!({
                "id": id,
                "type": MessageType::Heartbeat,
                "payload": {},
                "timestamp": 0,
                "sessionId": credentials.session_id,
                "securityToken": credentials.security_token,
            })
            .to_string()
        };
        page.post(message("early")).await.unwrap();
        page.inject(&credentials).await.unwrap();
        page.post(message("late")).await.unwrap();

        let reply: BridgeResponse = serde_json::from_str(&replies.recv().await.unwrap()).unwrap();
        assert_eq!(reply.id, "late");
        assert!(reply.success);

        let mut closed = page.closed().unwrap();
        page.close();
        closed.changed().await.unwrap();
        assert!(*closed.borrow());
        assert!(page.post(message("after")).await.is_err());
        assert!(page.window().wallet_mock_bridge().is_none());
    }
}
