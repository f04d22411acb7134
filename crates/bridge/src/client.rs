//! Typed handle to one installed wallet instance.

use crate::{
    bridge::MessageBridge,
    error::BridgeError,
    message::{InstancePayload, MessageType, UpdateConfigPayload},
};
use headless_wallet::{AccountDescriptor, WalletSnapshot, WalletUpdate};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

/// Drives an installed wallet through its bridge.
///
/// Every method is one bridge round trip, so all of them can fail with a [`BridgeError`].
#[derive(Clone, Debug)]
pub struct WalletClient {
    instance_id: String,
    bridge: Arc<MessageBridge>,
}

impl WalletClient {
    pub(crate) fn new(instance_id: String, bridge: Arc<MessageBridge>) -> Self {
        Self { instance_id, bridge }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn bridge(&self) -> &Arc<MessageBridge> {
        &self.bridge
    }

    pub async fn get_state(&self) -> Result<WalletSnapshot, BridgeError> {
        let payload = InstancePayload { instance_id: self.instance_id.clone() };
        self.bridge.send(MessageType::GetState, &payload).await
    }

    /// Applies `update` and returns the resulting state.
    pub async fn update(&self, update: WalletUpdate) -> Result<WalletSnapshot, BridgeError> {
        let payload = UpdateConfigPayload { instance_id: self.instance_id.clone(), update };
        self.bridge.send(MessageType::UpdateConfig, &payload).await
    }

    pub async fn switch_chain(&self, chain_id: impl Into<String>) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { chain_id: Some(chain_id.into()), ..Default::default() }).await
    }

    pub async fn switch_cluster(&self, cluster: impl Into<String>) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { cluster: Some(cluster.into()), ..Default::default() }).await
    }

    pub async fn switch_account(&self, id: Uuid) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { active_account: Some(id), ..Default::default() }).await
    }

    pub async fn add_accounts(
        &self,
        accounts: Vec<AccountDescriptor>,
    ) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { add_accounts: accounts, ..Default::default() }).await
    }

    pub async fn remove_accounts(&self, ids: Vec<Uuid>) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { remove_accounts: ids, ..Default::default() }).await
    }

    pub async fn connect(&self) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { connected: Some(true), ..Default::default() }).await
    }

    pub async fn disconnect(&self) -> Result<WalletSnapshot, BridgeError> {
        self.update(WalletUpdate { connected: Some(false), ..Default::default() }).await
    }

    pub async fn heartbeat(&self) -> Result<Duration, BridgeError> {
        self.bridge.heartbeat().await
    }
}
