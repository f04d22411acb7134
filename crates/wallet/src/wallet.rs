//! A complete simulated wallet: shared registries, both providers and their discovery.

use crate::{
    accounts::{AccountDescriptor, AccountInfo, AccountRegistry},
    chains::{Chain, ChainRegistry, normalize_chain_id},
    discovery::{Eip6963Announcer, ProviderInfo, WalletStandardRegistration, WindowTarget},
    error::ValidationError,
    evm::EvmProvider,
    security::NetworkValidator,
    solana::{ConnectInput, SolanaProvider, SolanaState},
    state::ProviderState,
};
use headless_wallet_config::WalletDefaults;
use headless_wallet_rpc::error::RpcError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Install options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOptions {
    #[serde(default)]
    pub accounts: Vec<AccountDescriptor>,
    /// Initial EVM chain, defaults to the first chain of the first EVM account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// Initial Solana cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_connect: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdns: Option<String>,
}

/// Changes applied to an installed wallet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_accounts: Vec<AccountDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_accounts: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_account: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Connect (`true`) or disconnect (`false`) both providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
}

/// Serializable state of a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub info: ProviderInfo,
    pub accounts: Vec<AccountInfo>,
    pub chains: Vec<Chain>,
    pub evm: ProviderState,
    pub solana: SolanaState,
}

#[derive(Debug)]
pub struct HeadlessWallet {
    accounts: Arc<RwLock<AccountRegistry>>,
    chains: Arc<RwLock<ChainRegistry>>,
    evm: EvmProvider,
    solana: SolanaProvider,
    announcer: Eip6963Announcer,
    registration: WalletStandardRegistration,
    auto_connect: bool,
}

impl HeadlessWallet {
    /// Validates the options and builds the wallet. Nothing is exposed to a page yet.
    pub fn new(
        options: &WalletOptions,
        defaults: &WalletDefaults,
        network: NetworkValidator,
    ) -> Result<Self, ValidationError> {
        let mut registry = AccountRegistry::new(&defaults.chain_id, &defaults.cluster);
        let infos = registry.create_many(&options.accounts)?;

        let mut chains = ChainRegistry::new();
        for info in &infos {
            for chain_id in &info.chain_ids {
                chains.ensure_evm_chain(chain_id)?;
            }
            for cluster in &info.clusters {
                chains.ensure_cluster(cluster)?;
            }
        }
        let chain_id = match &options.chain_id {
            Some(chain_id) => chain_id.clone(),
            None => chains
                .evm_chains()
                .next()
                .map(|chain| chain.id.clone())
                .unwrap_or_else(|| defaults.chain_id.clone()),
        };
        let chain_id = chains.ensure_evm_chain(&chain_id)?;
        chains.set_active_chain(&chain_id)?;
        let cluster = match &options.cluster {
            Some(cluster) => cluster.clone(),
            None => chains
                .clusters()
                .next()
                .map(|chain| chain.id.clone())
                .unwrap_or_else(|| defaults.cluster.clone()),
        };
        let cluster = chains.ensure_cluster(&cluster)?;
        chains.set_active_cluster(&cluster)?;

        let name = options.name.clone().unwrap_or_else(|| defaults.name.clone());
        if name.trim().is_empty() {
            return Err(ValidationError::invalid_value("name", "must not be empty"));
        }
        let icon = options.icon.clone().unwrap_or_else(|| defaults.icon.clone());
        if !icon.starts_with("data:image/") {
            return Err(ValidationError::invalid_value("icon", "must be a data:image URI"));
        }
        let rdns = options.rdns.clone().unwrap_or_else(|| defaults.rdns.clone());

        let accounts = Arc::new(RwLock::new(registry));
        let chains = Arc::new(RwLock::new(chains));
        let evm = EvmProvider::new(Arc::clone(&accounts), Arc::clone(&chains), network);
        let solana = SolanaProvider::new(Arc::clone(&accounts), Arc::clone(&chains), &name, &icon);
        debug!(target: "wallet", accounts = infos.len(), %chain_id, %cluster, "built wallet");

        Ok(Self {
            announcer: Eip6963Announcer::new(ProviderInfo::new(name, icon, rdns), evm.clone()),
            registration: WalletStandardRegistration::new(solana.clone()),
            auto_connect: options.auto_connect.unwrap_or(defaults.auto_connect),
            accounts,
            chains,
            evm,
            solana,
        })
    }

    /// Exposes the wallet on `window` and connects if auto connect is enabled.
    pub fn install(&self, window: &WindowTarget) -> Result<(), RpcError> {
        self.announcer.install(window);
        self.registration.install(window);
        if self.auto_connect {
            self.connect()?;
        }
        Ok(())
    }

    /// Connects every provider that has accounts for it.
    pub fn connect(&self) -> Result<(), RpcError> {
        let (has_evm, has_solana) = {
            let accounts = self.accounts.read();
            (
                accounts.iter().any(|account| account.evm().is_some()),
                accounts.iter().any(|account| account.solana().is_some()),
            )
        };
        if has_evm {
            self.evm.connect()?;
        }
        if has_solana {
            self.solana.connect(ConnectInput::default())?;
        }
        Ok(())
    }

    pub fn disconnect(&self) {
        self.evm.disconnect();
        self.solana.disconnect();
    }

    /// Applies `update`. Every part is validated before the first change.
    pub fn apply(&self, update: &WalletUpdate) -> Result<(), RpcError> {
        let chain_id = update.chain_id.as_deref().map(normalize_chain_id).transpose()?;
        {
            let accounts = self.accounts.read();
            for id in update.remove_accounts.iter().chain(&update.active_account) {
                if accounts.get(id).is_none() {
                    return Err(ValidationError::UnknownAccount(id.to_string()).into());
                }
            }
        }
        if let Some(id) = update.active_account.filter(|id| update.remove_accounts.contains(id)) {
            return Err(ValidationError::invalid_value(
                "activeAccount",
                format!("account {id} is removed by the same update"),
            )
            .into());
        }
        {
            // dry run of the chain changes
            let mut chains = self.chains.read().clone();
            if let Some(chain_id) = &chain_id {
                chains.ensure_evm_chain(chain_id)?;
            }
            if let Some(cluster) = &update.cluster {
                chains.ensure_cluster(cluster)?;
            }
        }

        {
            let mut accounts = self.accounts.write();
            let added = accounts.create_many(&update.add_accounts)?;
            let mut chains = self.chains.write();
            for info in &added {
                for chain_id in &info.chain_ids {
                    chains.ensure_evm_chain(chain_id)?;
                }
                for cluster in &info.clusters {
                    chains.ensure_cluster(cluster)?;
                }
            }
            for id in &update.remove_accounts {
                accounts.delete(id)?;
            }
            if let Some(id) = &update.active_account {
                accounts.set_active(id)?;
            }
        }
        self.evm.refresh_accounts();
        self.solana.refresh_accounts();

        if let Some(chain_id) = chain_id {
            self.chains.write().ensure_evm_chain(&chain_id)?;
            self.evm.switch_chain(&chain_id)?;
        }
        if let Some(cluster) = &update.cluster {
            self.solana.set_cluster(cluster)?;
        }
        match update.connected {
            Some(true) => self.connect()?,
            Some(false) => self.disconnect(),
            None => {}
        }
        Ok(())
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let chains = {
            let chains = self.chains.read();
            chains.evm_chains().chain(chains.clusters()).cloned().collect()
        };
        WalletSnapshot {
            info: self.announcer.info().clone(),
            accounts: self.accounts.read().list(),
            chains,
            evm: self.evm.state(),
            solana: self.solana.state(),
        }
    }

    /// Detaches from `window`, disconnects, drops every listener and wipes all keys.
    pub fn teardown(&self, window: &WindowTarget) {
        self.announcer.uninstall(window);
        self.registration.uninstall(window);
        self.disconnect();
        self.evm.events().remove_all_listeners(None);
        self.solana.events().remove_all_listeners(None);
        self.accounts.write().clear();
        debug!(target: "wallet", uuid = %self.announcer.info().uuid, "wallet torn down");
    }

    pub fn info(&self) -> &ProviderInfo {
        self.announcer.info()
    }

    pub fn evm(&self) -> &EvmProvider {
        &self.evm
    }

    pub fn solana(&self) -> &SolanaProvider {
        &self.solana
    }

    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.accounts.read().list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{WindowEvent, WindowEventKind};
    use parking_lot::Mutex;

    fn options(value: serde_json::Value) -> WalletOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn picks_first_account_chain() {
        let wallet = HeadlessWallet::new(
            &options(serde_json::json!({
                "accounts": [{"type": "evm_only", "evm": {"chainIds": ["1", "137"]}}]
            })),
            &WalletDefaults::default(),
            NetworkValidator::default(),
        )
        .unwrap();
        let snapshot = wallet.snapshot();
        assert_eq!(snapshot.evm.chain_id.as_deref(), Some("0x1"));
        assert_eq!(snapshot.solana.cluster, None);
        assert_eq!(snapshot.chains.len(), 3);
    }

    #[test]
    fn rejects_invalid_options() {
        let err = HeadlessWallet::new(
            &options(serde_json::json!({"accounts": [], "chainId": "ethereum"})),
            &WalletDefaults::default(),
            NetworkValidator::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidChainId(_)));
    }

    #[test]
    fn install_registers_and_auto_connects() {
        let window = WindowTarget::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [WindowEventKind::AnnounceProvider, WindowEventKind::RegisterWallet] {
            let sink = Arc::clone(&seen);
            window.on(kind, move |_: &WindowEvent| sink.lock().push(kind.name()));
        }
        let wallet = HeadlessWallet::new(
            &options(serde_json::json!({
                "accounts": [{"type": "dual_chain"}],
                "autoConnect": true
            })),
            &WalletDefaults::default(),
            NetworkValidator::default(),
        )
        .unwrap();
        wallet.install(&window).unwrap();
        assert_eq!(*seen.lock(), vec!["eip6963:announceProvider", "wallet-standard:register-wallet"]);
        assert!(wallet.evm().is_connected());
        assert!(wallet.solana().is_connected());

        wallet.teardown(&window);
        assert!(!wallet.evm().is_connected());
        assert!(wallet.accounts().is_empty());
        window.emit(&WindowEvent::RequestProvider);
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn apply_is_validated_first() {
        let wallet = HeadlessWallet::new(
            &options(serde_json::json!({"accounts": [{"type": "evm_only"}]})),
            &WalletDefaults::default(),
            NetworkValidator::default(),
        )
        .unwrap();
        let update = WalletUpdate {
            add_accounts: vec![AccountDescriptor::evm(["1"])],
            remove_accounts: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert!(wallet.apply(&update).is_err());
        assert_eq!(wallet.accounts().len(), 1);

        let update = WalletUpdate {
            add_accounts: vec![AccountDescriptor::evm(["10"])],
            chain_id: Some("10".into()),
            connected: Some(true),
            ..Default::default()
        };
        for cluster in ["", "solana:"] {
            let update = WalletUpdate {
                add_accounts: vec![AccountDescriptor::evm(["1"])],
                active_account: Some(wallet.accounts()[0].id),
                chain_id: Some("137".into()),
                cluster: Some(cluster.into()),
                ..Default::default()
            };
            assert!(wallet.apply(&update).is_err());
            assert_eq!(wallet.accounts().len(), 1);
            assert_eq!(wallet.evm().chain_id().as_deref(), Some("0x1"));
            assert!(wallet.snapshot().chains.iter().all(|chain| chain.id != "0x89"));
        }

        wallet.apply(&update).unwrap();
        assert_eq!(wallet.accounts().len(), 2);
        assert_eq!(wallet.evm().chain_id().as_deref(), Some("0xa"));
        assert_eq!(wallet.evm().state().accounts.len(), 2);
    }
}
