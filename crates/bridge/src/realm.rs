//! The page realm: the `window` object the simulated wallets are injected into.

use crate::dispatcher::PageDispatcher;
use headless_wallet::{
    EvmProvider, HeadlessWallet, SolanaProvider, WindowTarget, security::EnvironmentSnapshot,
};
use parking_lot::RwLock;
use std::{fmt, sync::Arc};
use url::Url;

#[derive(Default)]
struct Globals {
    /// `window.ethereum`
    ethereum: Option<EvmProvider>,
    /// `window.phantom.solana`
    phantom_solana: Option<SolanaProvider>,
    /// `window.__walletMockBridge`
    bridge: Option<Arc<PageDispatcher>>,
    /// `window.__walletMockInstances`, in install order
    instances: Vec<(String, Arc<HeadlessWallet>)>,
    /// Instance the provider globals currently point at.
    active: Option<String>,
}

/// A page's global object.
///
/// The provider globals always belong to the most recently installed instance that is still
/// present, or are unset when there is none.
pub struct Window {
    url: Url,
    environment: EnvironmentSnapshot,
    events: WindowTarget,
    globals: RwLock<Globals>,
}

impl Window {
    pub fn new(url: Url, environment: EnvironmentSnapshot) -> Self {
        Self {
            environment: environment.with_page_url(url.clone()),
            url,
            events: WindowTarget::new(),
            globals: Default::default(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `scheme://host[:port]` of the page.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    /// The window as an event target, for discovery events.
    pub fn events(&self) -> &WindowTarget {
        &self.events
    }

    pub fn ethereum(&self) -> Option<EvmProvider> {
        self.globals.read().ethereum.clone()
    }

    pub fn phantom_solana(&self) -> Option<SolanaProvider> {
        self.globals.read().phantom_solana.clone()
    }

    pub fn wallet_mock_bridge(&self) -> Option<Arc<PageDispatcher>> {
        self.globals.read().bridge.clone()
    }

    pub(crate) fn set_bridge(&self, dispatcher: Option<Arc<PageDispatcher>>) {
        self.globals.write().bridge = dispatcher;
    }

    /// Ids of the installed instances, in install order.
    pub fn wallet_mock_instances(&self) -> Vec<String> {
        self.globals.read().instances.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn instance(&self, id: &str) -> Option<Arc<HeadlessWallet>> {
        self.globals.read().instances.iter().find(|(known, _)| known == id).map(|(_, w)| w.clone())
    }

    pub fn instance_count(&self) -> usize {
        self.globals.read().instances.len()
    }

    /// Adds `wallet` and points the provider globals at it. Returns the instance it replaced.
    pub(crate) fn insert_instance(
        &self,
        id: String,
        wallet: Arc<HeadlessWallet>,
    ) -> Option<Arc<HeadlessWallet>> {
        let mut globals = self.globals.write();
        let replaced = take_instance(&mut globals.instances, &id);
        globals.ethereum = Some(wallet.evm().clone());
        globals.phantom_solana = Some(wallet.solana().clone());
        globals.active = Some(id.clone());
        globals.instances.push((id, wallet));
        replaced
    }

    /// Removes an instance. If the globals pointed at it they move to the latest remaining one.
    pub(crate) fn remove_instance(&self, id: &str) -> Option<Arc<HeadlessWallet>> {
        let mut globals = self.globals.write();
        let removed = take_instance(&mut globals.instances, id)?;
        if globals.active.as_deref() == Some(id) {
            let latest = globals.instances.last().cloned();
            globals.ethereum = latest.as_ref().map(|(_, wallet)| wallet.evm().clone());
            globals.phantom_solana = latest.as_ref().map(|(_, wallet)| wallet.solana().clone());
            globals.active = latest.map(|(id, _)| id);
        }
        Some(removed)
    }

    /// Removes every instance and unsets the provider globals.
    pub(crate) fn drain_instances(&self) -> Vec<(String, Arc<HeadlessWallet>)> {
        let mut globals = self.globals.write();
        globals.ethereum = None;
        globals.phantom_solana = None;
        globals.active = None;
        std::mem::take(&mut globals.instances)
    }
}

fn take_instance(
    instances: &mut Vec<(String, Arc<HeadlessWallet>)>,
    id: &str,
) -> Option<Arc<HeadlessWallet>> {
    let index = instances.iter().position(|(known, _)| known == id)?;
    Some(instances.remove(index).1)
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("url", &self.url.as_str())
            .field("instances", &self.wallet_mock_instances())
            .finish_non_exhaustive()
    }
}
