//! Provider discovery through window events: EIP-6963 for the EVM provider and Wallet Standard
//! registration for the Solana provider.

use crate::{
    evm::EvmProvider,
    events::{EventEmitter, ListenerId, WalletEvent},
    solana::SolanaProvider,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Events dispatched on the page `window`.
#[derive(Clone, Debug)]
pub enum WindowEvent {
    /// `eip6963:announceProvider`
    AnnounceProvider(ProviderDetail),
    /// `eip6963:requestProvider`
    RequestProvider,
    /// `wallet-standard:register-wallet`
    RegisterWallet(SolanaProvider),
    /// `wallet-standard:app-ready`
    AppReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WindowEventKind {
    AnnounceProvider,
    RequestProvider,
    RegisterWallet,
    AppReady,
}

impl WindowEventKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AnnounceProvider => "eip6963:announceProvider",
            Self::RequestProvider => "eip6963:requestProvider",
            Self::RegisterWallet => "wallet-standard:register-wallet",
            Self::AppReady => "wallet-standard:app-ready",
        }
    }
}

impl fmt::Display for WindowEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl WalletEvent for WindowEvent {
    type Kind = WindowEventKind;

    fn kind(&self) -> WindowEventKind {
        match self {
            Self::AnnounceProvider(_) => WindowEventKind::AnnounceProvider,
            Self::RequestProvider => WindowEventKind::RequestProvider,
            Self::RegisterWallet(_) => WindowEventKind::RegisterWallet,
            Self::AppReady => WindowEventKind::AppReady,
        }
    }
}

/// The page `window` as an event target.
pub type WindowTarget = EventEmitter<WindowEvent>;

/// EIP-6963 provider info.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Fresh per provider instance.
    pub uuid: String,
    pub name: String,
    /// Data URI.
    pub icon: String,
    pub rdns: String,
}

impl ProviderInfo {
    pub fn new(name: impl Into<String>, icon: impl Into<String>, rdns: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            name: name.into(),
            icon: icon.into(),
            rdns: rdns.into(),
        }
    }
}

/// `detail` of an `eip6963:announceProvider` event.
#[derive(Clone, Debug)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: EvmProvider,
}

/// Announces a provider on install and again on every `eip6963:requestProvider`.
#[derive(Debug)]
pub struct Eip6963Announcer {
    detail: ProviderDetail,
    listener: Mutex<Option<ListenerId>>,
}

impl Eip6963Announcer {
    pub fn new(info: ProviderInfo, provider: EvmProvider) -> Self {
        Self { detail: ProviderDetail { info, provider }, listener: Mutex::new(None) }
    }

    pub fn info(&self) -> &ProviderInfo {
        &self.detail.info
    }

    pub fn announce(&self, target: &WindowTarget) {
        trace!(target: "wallet::discovery", uuid = %self.detail.info.uuid, "announcing provider");
        target.emit(&WindowEvent::AnnounceProvider(self.detail.clone()));
    }

    /// Announces once and keeps answering discovery requests until [`Self::uninstall`].
    pub fn install(&self, target: &WindowTarget) {
        let mut listener = self.listener.lock();
        if listener.is_none() {
            let detail = self.detail.clone();
            let window = target.clone();
            *listener = Some(target.on(WindowEventKind::RequestProvider, move |_| {
                window.emit(&WindowEvent::AnnounceProvider(detail.clone()));
            }));
        }
        drop(listener);
        self.announce(target);
    }

    pub fn uninstall(&self, target: &WindowTarget) {
        if let Some(id) = self.listener.lock().take() {
            target.remove_listener(id);
        }
    }
}

/// Registers the Solana wallet now and whenever an app signals `wallet-standard:app-ready`.
#[derive(Debug)]
pub struct WalletStandardRegistration {
    wallet: SolanaProvider,
    listener: Mutex<Option<ListenerId>>,
}

impl WalletStandardRegistration {
    pub fn new(wallet: SolanaProvider) -> Self {
        Self { wallet, listener: Mutex::new(None) }
    }

    pub fn install(&self, target: &WindowTarget) {
        let mut listener = self.listener.lock();
        if listener.is_none() {
            let wallet = self.wallet.clone();
            let window = target.clone();
            *listener = Some(target.on(WindowEventKind::AppReady, move |_| {
                window.emit(&WindowEvent::RegisterWallet(wallet.clone()));
            }));
        }
        drop(listener);
        target.emit(&WindowEvent::RegisterWallet(self.wallet.clone()));
    }

    pub fn uninstall(&self, target: &WindowTarget) {
        if let Some(id) = self.listener.lock().take() {
            target.remove_listener(id);
        }
    }
}
