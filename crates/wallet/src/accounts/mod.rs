//! Simulated accounts and their registry.

use crate::{
    chains::{cluster_name, normalize_chain_id},
    error::ValidationError,
};
use alloy_primitives::{Address, hex};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

pub mod keys;
pub use keys::{EvmKey, SolanaKey};

/// Which chain families an account carries keys for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    EvmOnly,
    SolanaOnly,
    DualChain,
}

impl AccountType {
    pub fn has_evm(&self) -> bool {
        matches!(self, Self::EvmOnly | Self::DualChain)
    }

    pub fn has_solana(&self) -> bool {
        matches!(self, Self::SolanaOnly | Self::DualChain)
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EvmOnly => "evm_only",
            Self::SolanaOnly => "solana_only",
            Self::DualChain => "dual_chain",
        })
    }
}

/// Describes an account to create.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDescriptor {
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm: Option<EvmDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solana: Option<SolanaDescriptor>,
}

impl AccountDescriptor {
    pub fn evm(chain_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            account_type: AccountType::EvmOnly,
            evm: Some(EvmDescriptor {
                chain_ids: chain_ids.into_iter().map(Into::into).collect(),
                private_key: None,
            }),
            ..Default::default()
        }
    }

    pub fn solana(clusters: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            account_type: AccountType::SolanaOnly,
            solana: Some(SolanaDescriptor {
                clusters: clusters.into_iter().map(Into::into).collect(),
                secret_key: None,
            }),
            ..Default::default()
        }
    }

    pub fn dual(
        chain_ids: impl IntoIterator<Item = impl Into<String>>,
        clusters: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            account_type: AccountType::DualChain,
            evm: Self::evm(chain_ids).evm,
            solana: Self::solana(clusters).solana,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.evm.get_or_insert_with(Default::default).private_key = Some(key.into());
        self
    }

    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.solana.get_or_insert_with(Default::default).secret_key = Some(key.into());
        self
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmDescriptor {
    #[serde(default)]
    pub chain_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaDescriptor {
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

// keys must never end up in logs
impl fmt::Debug for EvmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmDescriptor")
            .field("chain_ids", &self.chain_ids)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for SolanaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaDescriptor")
            .field("clusters", &self.clusters)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The EVM half of an account.
#[derive(Debug)]
pub struct EvmAccount {
    key: EvmKey,
    pub chain_ids: Vec<String>,
}

impl EvmAccount {
    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// Lowercase `0x` prefixed address, the form returned by `eth_accounts`.
    pub fn address_hex(&self) -> String {
        hex::encode_prefixed(self.key.address())
    }

    pub fn key(&self) -> &EvmKey {
        &self.key
    }
}

/// The Solana half of an account.
#[derive(Debug)]
pub struct SolanaAccount {
    key: SolanaKey,
    pub clusters: Vec<String>,
}

impl SolanaAccount {
    pub fn public_key(&self) -> String {
        self.key.public_key()
    }

    pub fn key(&self) -> &SolanaKey {
        &self.key
    }
}

#[derive(Debug)]
enum ChainKeys {
    Evm(EvmAccount),
    Solana(SolanaAccount),
    Dual { evm: EvmAccount, solana: SolanaAccount },
}

/// A registered account with its key material.
#[derive(Debug)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    /// Creation time in unix milliseconds.
    pub created_at: u64,
    pub is_active: bool,
    keys: ChainKeys,
}

impl Account {
    pub fn account_type(&self) -> AccountType {
        match self.keys {
            ChainKeys::Evm(_) => AccountType::EvmOnly,
            ChainKeys::Solana(_) => AccountType::SolanaOnly,
            ChainKeys::Dual { .. } => AccountType::DualChain,
        }
    }

    pub fn evm(&self) -> Option<&EvmAccount> {
        match &self.keys {
            ChainKeys::Evm(evm) | ChainKeys::Dual { evm, .. } => Some(evm),
            ChainKeys::Solana(_) => None,
        }
    }

    pub fn solana(&self) -> Option<&SolanaAccount> {
        match &self.keys {
            ChainKeys::Solana(solana) | ChainKeys::Dual { solana, .. } => Some(solana),
            ChainKeys::Evm(_) => None,
        }
    }

    /// Public view of the account.
    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            id: self.id,
            account_type: self.account_type(),
            name: self.name.clone(),
            created_at: self.created_at,
            is_active: self.is_active,
            evm_address: self.evm().map(EvmAccount::address_hex),
            chain_ids: self.evm().map(|evm| evm.chain_ids.clone()).unwrap_or_default(),
            solana_public_key: self.solana().map(SolanaAccount::public_key),
            clusters: self.solana().map(|solana| solana.clusters.clone()).unwrap_or_default(),
        }
    }

    fn wipe(&mut self) {
        match &mut self.keys {
            ChainKeys::Evm(evm) => evm.key.wipe(),
            ChainKeys::Solana(solana) => solana.key.wipe(),
            ChainKeys::Dual { evm, solana } => {
                evm.key.wipe();
                solana.key.wipe();
            }
        }
    }
}

/// Serializable public view of an [`Account`], never contains key material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub name: String,
    pub created_at: u64,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solana_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<String>,
}

/// Partial update applied by [`AccountRegistry::update`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Setting `true` makes the account the active one, `false` is ignored for the active account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Accounts in registration order, at most one of them active.
#[derive(Debug)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
    default_chain_id: String,
    default_cluster: String,
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new("0x1", "devnet")
    }
}

impl AccountRegistry {
    /// Creates an empty registry. The defaults are used for descriptors that don't name chains.
    pub fn new(default_chain_id: impl Into<String>, default_cluster: impl Into<String>) -> Self {
        Self {
            accounts: Vec::new(),
            default_chain_id: default_chain_id.into(),
            default_cluster: default_cluster.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Creates one account. The first account of a registry becomes active.
    pub fn create(&mut self, descriptor: &AccountDescriptor) -> Result<AccountInfo, ValidationError> {
        let account = self.build(descriptor)?;
        Ok(self.insert(account))
    }

    /// Creates all accounts or none: every descriptor is validated before the first insert.
    pub fn create_many(
        &mut self,
        descriptors: &[AccountDescriptor],
    ) -> Result<Vec<AccountInfo>, ValidationError> {
        let accounts =
            descriptors.iter().map(|desc| self.build(desc)).collect::<Result<Vec<_>, _>>()?;
        Ok(accounts.into_iter().map(|account| self.insert(account)).collect())
    }

    fn insert(&mut self, mut account: Account) -> AccountInfo {
        account.is_active = self.active().is_none();
        debug!(target: "wallet::accounts", id = %account.id, kind = %account.account_type(), "created account");
        let info = account.info();
        self.accounts.push(account);
        info
    }

    fn build(&self, descriptor: &AccountDescriptor) -> Result<Account, ValidationError> {
        let account_type = descriptor.account_type;
        if !account_type.has_evm() && descriptor.evm.is_some() {
            return Err(ValidationError::UnexpectedChainConfig { account_type, chain: "evm" });
        }
        if !account_type.has_solana() && descriptor.solana.is_some() {
            return Err(ValidationError::UnexpectedChainConfig { account_type, chain: "solana" });
        }

        let keys = match account_type {
            AccountType::EvmOnly => ChainKeys::Evm(self.build_evm(descriptor.evm.as_ref())?),
            AccountType::SolanaOnly => {
                ChainKeys::Solana(self.build_solana(descriptor.solana.as_ref())?)
            }
            AccountType::DualChain => ChainKeys::Dual {
                evm: self.build_evm(descriptor.evm.as_ref())?,
                solana: self.build_solana(descriptor.solana.as_ref())?,
            },
        };

        let name = match descriptor.name.as_deref().map(str::trim) {
            Some("") => return Err(ValidationError::invalid_value("name", "must not be empty")),
            Some(name) => name.to_string(),
            None => format!("Account {}", self.accounts.len() + 1),
        };

        Ok(Account { id: Uuid::new_v4(), name, created_at: now_millis(), is_active: false, keys })
    }

    fn build_evm(&self, descriptor: Option<&EvmDescriptor>) -> Result<EvmAccount, ValidationError> {
        let mut chain_ids = Vec::new();
        for raw in descriptor.map(|desc| desc.chain_ids.as_slice()).unwrap_or_default() {
            let id = normalize_chain_id(raw)?;
            if !chain_ids.contains(&id) {
                chain_ids.push(id);
            }
        }
        if chain_ids.is_empty() {
            chain_ids.push(normalize_chain_id(&self.default_chain_id)?);
        }
        let key = match descriptor.and_then(|desc| desc.private_key.as_deref()) {
            Some(raw) => EvmKey::from_hex(raw)?,
            None => EvmKey::random(),
        };
        Ok(EvmAccount { key, chain_ids })
    }

    fn build_solana(
        &self,
        descriptor: Option<&SolanaDescriptor>,
    ) -> Result<SolanaAccount, ValidationError> {
        let mut clusters = Vec::new();
        for raw in descriptor.map(|desc| desc.clusters.as_slice()).unwrap_or_default() {
            let cluster = cluster_name(raw.trim());
            if cluster.is_empty() {
                return Err(ValidationError::invalid_value("clusters", "empty cluster name"));
            }
            if !clusters.iter().any(|known| known == cluster) {
                clusters.push(cluster.to_string());
            }
        }
        if clusters.is_empty() {
            clusters.push(cluster_name(&self.default_cluster).to_string());
        }
        let key = match descriptor.and_then(|desc| desc.secret_key.as_deref()) {
            Some(raw) => SolanaKey::from_encoded(raw)?,
            None => SolanaKey::random(),
        };
        Ok(SolanaAccount { key, clusters })
    }

    pub fn get(&self, id: &Uuid) -> Option<&Account> {
        self.accounts.iter().find(|account| account.id == *id)
    }

    /// Public views of all accounts in registration order.
    pub fn list(&self) -> Vec<AccountInfo> {
        self.accounts.iter().map(Account::info).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn update(&mut self, id: &Uuid, update: AccountUpdate) -> Result<AccountInfo, ValidationError> {
        let index = self.position(id)?;
        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::invalid_value("name", "must not be empty"));
            }
            self.accounts[index].name = name.to_string();
        }
        if update.is_active == Some(true) {
            self.activate(index);
        }
        Ok(self.accounts[index].info())
    }

    /// Removes the account and wipes its keys. If it was active, the first remaining account
    /// takes over.
    pub fn delete(&mut self, id: &Uuid) -> Result<AccountInfo, ValidationError> {
        let index = self.position(id)?;
        let mut account = self.accounts.remove(index);
        account.wipe();
        if account.is_active {
            if let Some(next) = self.accounts.first_mut() {
                next.is_active = true;
            }
        }
        debug!(target: "wallet::accounts", id = %account.id, "deleted account");
        Ok(account.info())
    }

    /// Removes every account, wiping all keys.
    pub fn clear(&mut self) {
        for account in &mut self.accounts {
            account.wipe();
        }
        self.accounts.clear();
    }

    pub fn active(&self) -> Option<&Account> {
        self.accounts.iter().find(|account| account.is_active)
    }

    pub fn set_active(&mut self, id: &Uuid) -> Result<AccountInfo, ValidationError> {
        let index = self.position(id)?;
        self.activate(index);
        Ok(self.accounts[index].info())
    }

    /// Activates the `index`th account that carries an EVM key.
    pub fn set_active_evm(&mut self, index: usize) -> Result<AccountInfo, ValidationError> {
        let id = self.nth_with(index, |account| account.evm().is_some())?;
        self.set_active(&id)
    }

    /// Activates the `index`th account that carries a Solana key.
    pub fn set_active_solana(&mut self, index: usize) -> Result<AccountInfo, ValidationError> {
        let id = self.nth_with(index, |account| account.solana().is_some())?;
        self.set_active(&id)
    }

    fn nth_with(&self, index: usize, f: impl Fn(&Account) -> bool) -> Result<Uuid, ValidationError> {
        let mut matching = self.accounts.iter().filter(|account| f(account));
        let len = self.accounts.iter().filter(|account| f(account)).count();
        matching
            .nth(index)
            .map(|account| account.id)
            .ok_or(ValidationError::AccountIndexOutOfRange { index, len })
    }

    fn activate(&mut self, index: usize) {
        for (i, account) in self.accounts.iter_mut().enumerate() {
            account.is_active = i == index;
        }
    }

    fn position(&self, id: &Uuid) -> Result<usize, ValidationError> {
        self.accounts
            .iter()
            .position(|account| account.id == *id)
            .ok_or_else(|| ValidationError::UnknownAccount(id.to_string()))
    }

    /// EVM addresses with the active account's first, the rest in registration order.
    pub fn evm_addresses(&self) -> Vec<String> {
        self.ordered(|account| account.evm().map(EvmAccount::address_hex))
    }

    /// Solana public keys with the active account's first, the rest in registration order.
    pub fn solana_public_keys(&self) -> Vec<String> {
        self.ordered(|account| account.solana().map(SolanaAccount::public_key))
    }

    fn ordered(&self, f: impl Fn(&Account) -> Option<String>) -> Vec<String> {
        let active = self.accounts.iter().filter(|account| account.is_active);
        let rest = self.accounts.iter().filter(|account| !account.is_active);
        active.chain(rest).filter_map(f).collect()
    }

    /// Case insensitive lookup by EVM address.
    pub fn find_evm(&self, address: &str) -> Option<&EvmAccount> {
        let address = address.trim();
        self.accounts
            .iter()
            .filter_map(Account::evm)
            .find(|evm| evm.address_hex().eq_ignore_ascii_case(address))
    }

    pub fn find_solana(&self, public_key: &str) -> Option<&SolanaAccount> {
        self.accounts.iter().filter_map(Account::solana).find(|sol| sol.public_key() == public_key)
    }
}

impl Drop for AccountRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn creates_accounts_from_descriptors() {
        let mut registry = AccountRegistry::default();
        let info = registry
            .create(&AccountDescriptor::evm(["1", "137"]).with_private_key(DEV_KEY))
            .unwrap();
        assert_eq!(info.account_type, AccountType::EvmOnly);
        assert_eq!(info.evm_address.as_deref(), Some(DEV_ADDRESS));
        assert_eq!(info.chain_ids, vec!["0x1", "0x89"]);
        assert!(info.is_active);
        assert_eq!(info.name, "Account 1");

        let dual = registry.create(&AccountDescriptor::dual(Vec::<String>::new(), ["devnet"])).unwrap();
        assert!(!dual.is_active);
        assert_eq!(dual.chain_ids, vec!["0x1"]);
        assert!(dual.solana_public_key.is_some());
    }

    #[test]
    fn parses_descriptor_json() {
        let desc: AccountDescriptor = serde_json::from_value(serde_json::json!({
            "type": "dual_chain",
            "name": "Alice",
            "evm": { "chainIds": ["0x1"] },
            "solana": { "clusters": ["solana:mainnet"] }
        }))
        .unwrap();
        let mut registry = AccountRegistry::default();
        let info = registry.create(&desc).unwrap();
        assert_eq!(info.name, "Alice");
        assert_eq!(info.clusters, vec!["mainnet-beta"]);
    }

    #[test]
    fn rejects_mismatched_chain_config_without_applying() {
        let mut registry = AccountRegistry::default();
        let bad = AccountDescriptor {
            account_type: AccountType::EvmOnly,
            solana: Some(SolanaDescriptor::default()),
            ..Default::default()
        };
        let err = registry.create_many(&[AccountDescriptor::evm(["1"]), bad]).unwrap_err();
        assert!(matches!(err, ValidationError::UnexpectedChainConfig { chain: "solana", .. }));
        assert!(registry.is_empty());

        let err = registry.create(&AccountDescriptor::evm(["mainnet"])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidChainId(_)));
    }

    #[test]
    fn active_account_is_listed_first() {
        let mut registry = AccountRegistry::default();
        let infos = registry
            .create_many(&[
                AccountDescriptor::evm(["1"]),
                AccountDescriptor::solana(["devnet"]),
                AccountDescriptor::evm(["1"]),
                AccountDescriptor::evm(["1"]),
            ])
            .unwrap();
        let addresses: Vec<_> =
            infos.iter().filter_map(|info| info.evm_address.clone()).collect();
        assert_eq!(registry.evm_addresses(), addresses);

        registry.set_active_evm(2).unwrap();
        assert_eq!(
            registry.evm_addresses(),
            vec![addresses[2].clone(), addresses[0].clone(), addresses[1].clone()]
        );
        assert!(matches!(
            registry.set_active_evm(3),
            Err(ValidationError::AccountIndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn update_and_delete() {
        let mut registry = AccountRegistry::default();
        let first = registry.create(&AccountDescriptor::evm(["1"]).with_private_key(DEV_KEY)).unwrap();
        let second = registry.create(&AccountDescriptor::evm(["1"])).unwrap();

        let updated = registry
            .update(&second.id, AccountUpdate { name: Some("Bob".into()), is_active: Some(true) })
            .unwrap();
        assert_eq!(updated.name, "Bob");
        assert!(updated.is_active);
        assert!(!registry.get(&first.id).unwrap().is_active);

        assert!(registry.find_evm(&DEV_ADDRESS.to_uppercase().replace("0X", "0x")).is_some());

        registry.delete(&second.id).unwrap();
        assert!(registry.get(&first.id).unwrap().is_active);
        assert!(matches!(registry.delete(&second.id), Err(ValidationError::UnknownAccount(_))));

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.find_evm(DEV_ADDRESS).is_none());
    }
}
