//! Installs wallets into pages and tears them down again.

use crate::{
    bridge::{BridgeState, MessageBridge},
    client::WalletClient,
    error::{BridgeError, InstallationError},
    instances::{InstanceRegistry, WalletInstance},
    isolation::{CleanupSummary, IsolationGroup, IsolationManager},
    message::{InstallWalletPayload, InstallWalletResult, InstancePayload, MessageType},
    transport::PageTransport,
};
use headless_wallet::{WalletOptions, logging::WALLET_USER_LOG_TARGET, security::EnvironmentSnapshot};
use headless_wallet_config::Config;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Options of [`WalletInstaller::install`].
#[derive(Clone, Debug, Default)]
pub struct InstallOptions {
    /// Defaults to a random id.
    pub instance_id: Option<String>,
    pub wallet: WalletOptions,
    /// Test the instance belongs to, for [`WalletInstaller::cleanup_test`].
    pub test_id: Option<String>,
    /// Replace an instance with the same id instead of failing.
    pub override_existing: bool,
    /// Handshake with the page before installing.
    pub wait_for_ready: bool,
    /// Bounds bridge initialization, defaults to the handshake timeout.
    pub timeout: Option<Duration>,
}

impl InstallOptions {
    pub fn new(wallet: WalletOptions) -> Self {
        Self { wallet, ..Default::default() }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }

    pub fn override_existing(mut self) -> Self {
        self.override_existing = true;
        self
    }

    pub fn wait_for_ready(mut self, timeout: Option<Duration>) -> Self {
        self.wait_for_ready = true;
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct PageEntry {
    bridge: Arc<MessageBridge>,
    context_id: String,
}

/// Owns the bridges of every page it installed into, the instance registry and the isolation
/// groups. Cheap to clone, clones share everything.
#[derive(Clone, Debug)]
pub struct WalletInstaller {
    config: Arc<Config>,
    environment: EnvironmentSnapshot,
    registry: Arc<InstanceRegistry>,
    isolation: Arc<IsolationManager>,
    pages: Arc<Mutex<HashMap<String, PageEntry>>>,
}

impl WalletInstaller {
    pub fn new(config: Config, environment: EnvironmentSnapshot) -> Self {
        Self {
            registry: Arc::new(InstanceRegistry::new(config.security.max_instances)),
            config: Arc::new(config),
            environment,
            isolation: Default::default(),
            pages: Default::default(),
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn isolation(&self) -> &IsolationManager {
        &self.isolation
    }

    /// Installs a wallet into the page behind `transport`.
    ///
    /// The first install into a page creates its bridge. Nothing is registered unless the page
    /// confirmed the install.
    pub async fn install(
        &self,
        transport: Arc<dyn PageTransport>,
        options: InstallOptions,
    ) -> Result<WalletClient, InstallationError> {
        let instance_id = options.instance_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        // held until the page confirmed, errors below release the id
        let reservation = self.registry.reserve(&instance_id, options.override_existing)?;
        let bridge = self.bridge_for(&transport, options.wait_for_ready, options.timeout).await?;

        if let Some(existing) =
            reservation.existing().filter(|existing| existing.page_id != transport.page_id())
        {
            // replaced instances on other pages are removed best effort
            if let Err(err) = remove_from_page(existing).await {
                warn!(target: "bridge::installer", instance_id = %existing.instance_id, %err, "failed to remove replaced instance");
            }
        }

        let payload = InstallWalletPayload {
            instance_id: instance_id.clone(),
            override_existing: options.override_existing,
            options: options.wallet,
        };
        let installation: InstallWalletResult = bridge.send(MessageType::InstallWallet, &payload).await?;

        reservation.commit(WalletInstance {
            instance_id: instance_id.clone(),
            page_id: transport.page_id().to_string(),
            context_id: transport.context_id().to_string(),
            test_id: options.test_id.clone(),
            bridge: Arc::clone(&bridge),
            installation,
            installed_at: SystemTime::now(),
        });
        self.isolation.unregister(&instance_id);
        self.isolation.register(&instance_id, options.test_id.as_deref(), transport.context_id());
        info!(target: WALLET_USER_LOG_TARGET, %instance_id, page = %transport.page_id(), "installed wallet");
        Ok(WalletClient::new(instance_id, bridge))
    }

    /// The ready bridge of the page, created on first use.
    async fn bridge_for(
        &self,
        transport: &Arc<dyn PageTransport>,
        handshake: bool,
        timeout: Option<Duration>,
    ) -> Result<Arc<MessageBridge>, BridgeError> {
        let mut pages = self.pages.lock().await;
        if let Some(entry) = pages.get(transport.page_id()) {
            if entry.bridge.state() == BridgeState::Ready {
                return Ok(Arc::clone(&entry.bridge));
            }
            entry.bridge.cleanup().await;
            pages.remove(transport.page_id());
        }

        let bridge =
            Arc::new(MessageBridge::new(Arc::clone(transport), &self.config, &self.environment)?);
        let timeout = timeout.unwrap_or_else(|| self.config.bridge.handshake_timeout());
        match tokio::time::timeout(timeout, bridge.initialize(handshake)).await {
            Ok(result) => result?,
            Err(_) => {
                bridge.cleanup().await;
                return Err(BridgeError::Timeout { message_type: MessageType::SecurityCheck, timeout });
            }
        }
        pages.insert(
            transport.page_id().to_string(),
            PageEntry { bridge: Arc::clone(&bridge), context_id: transport.context_id().to_string() },
        );
        drop(pages);
        self.watch_close(transport);
        Ok(bridge)
    }

    fn watch_close(&self, transport: &Arc<dyn PageTransport>) {
        let Some(mut closed) = transport.closed() else { return };
        let installer = self.clone();
        let page_id = transport.page_id().to_string();
        tokio::spawn(async move {
            while !*closed.borrow_and_update() {
                if closed.changed().await.is_err() {
                    return;
                }
            }
            installer.page_closed(&page_id).await;
        });
    }

    /// Forgets every instance of a closed page and shuts its bridge down.
    async fn page_closed(&self, page_id: &str) {
        let removed = self.registry.on_page(page_id);
        for instance_id in &removed {
            self.registry.remove(instance_id);
            self.isolation.unregister(instance_id);
        }
        let entry = self.pages.lock().await.remove(page_id);
        if let Some(entry) = entry {
            entry.bridge.cleanup().await;
        }
        debug!(target: "bridge::installer", %page_id, instances = removed.len(), "page closed");
    }

    /// Removes one instance from its page.
    pub async fn remove(&self, instance_id: &str) -> Result<(), InstallationError> {
        let instance = self
            .registry
            .remove(instance_id)
            .ok_or_else(|| InstallationError::MissingInstance(instance_id.to_string()))?;
        self.isolation.unregister(instance_id);
        remove_from_page(&instance).await?;
        info!(target: WALLET_USER_LOG_TARGET, %instance_id, "removed wallet");
        Ok(())
    }

    /// Removes every instance installed for `test_id`.
    pub async fn cleanup_test(&self, test_id: &str) -> CleanupSummary {
        self.cleanup_group(&IsolationGroup::Test(test_id.to_string())).await
    }

    /// Removes every instance of the browser context and shuts down the bridges of its pages.
    pub async fn cleanup_context(&self, context_id: &str) -> CleanupSummary {
        let summary = self.cleanup_group(&IsolationGroup::Context(context_id.to_string())).await;
        let bridges: Vec<_> = {
            let mut pages = self.pages.lock().await;
            let page_ids: Vec<_> = pages
                .iter()
                .filter(|(_, entry)| entry.context_id == context_id)
                .map(|(id, _)| id.clone())
                .collect();
            page_ids.iter().filter_map(|id| pages.remove(id)).map(|entry| entry.bridge).collect()
        };
        for bridge in bridges {
            bridge.cleanup().await;
        }
        summary
    }

    /// Removes every instance and shuts down every bridge.
    pub async fn cleanup_all(&self) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        for group in self.isolation.groups() {
            summary.merge(self.cleanup_group(&group).await);
        }
        let entries: Vec<_> = self.pages.lock().await.drain().map(|(_, entry)| entry).collect();
        for entry in entries {
            entry.bridge.cleanup().await;
        }
        summary
    }

    async fn cleanup_group(&self, group: &IsolationGroup) -> CleanupSummary {
        self.isolation.cleanup(group, |instance_id: String| async move { self.remove(&instance_id).await }).await
    }
}

async fn remove_from_page(instance: &WalletInstance) -> Result<(), BridgeError> {
    let payload = InstancePayload { instance_id: instance.instance_id.clone() };
    let _: bool = instance.bridge.send(MessageType::RemoveWallet, &payload).await?;
    Ok(())
}
