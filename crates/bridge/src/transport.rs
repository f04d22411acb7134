//! The boundary between the driver and a page realm.

use crate::{error::BridgeError, session::SessionCredentials};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Carries serialized bridge messages into a page and replies back out.
///
/// Replies are delivered through the receiver returned by [`PageTransport::take_replies`], in
/// the order the page produced them.
#[async_trait]
pub trait PageTransport: fmt::Debug + Send + Sync + 'static {
    /// Identifies the page.
    fn page_id(&self) -> &str;

    /// Identifies the browser context the page belongs to.
    fn context_id(&self) -> &str;

    /// Installs the page side dispatcher bound to `credentials`.
    async fn inject(&self, credentials: &SessionCredentials) -> Result<(), BridgeError>;

    /// Posts a serialized message into the page.
    async fn post(&self, message: String) -> Result<(), BridgeError>;

    /// The reply stream. Only the first call returns it.
    fn take_replies(&self) -> Option<mpsc::UnboundedReceiver<String>>;

    /// Flips to `true` once the page is closed. `None` if the transport can't tell.
    fn closed(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}
