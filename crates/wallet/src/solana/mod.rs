//! Solana provider following the Wallet Standard.

use crate::{
    accounts::{AccountDescriptor, AccountRegistry, SolanaKey},
    chains::{ChainRegistry, ChainType, wallet_standard_chain},
    error::ValidationError,
    events::{EventEmitter, ListenerId, SolanaEvent, SolanaEventKind},
    macros::wallet_info,
};
use headless_wallet_rpc::error::{ErrorCode, RpcError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

pub mod features;
pub use features::{
    Bytes, ConnectInput, ConnectOutput, Feature, SignAndSendTransactionInput,
    SignAndSendTransactionOutput, SignMessageInput, SignMessageOutput, SignTransactionInput,
    SignTransactionOutput, WALLET_STANDARD_VERSION, WalletAccount, WalletInfo,
};

/// Connection state of the Solana provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaState {
    pub is_connected: bool,
    /// Set after the first approved connect, silent connects only succeed afterwards.
    pub is_trusted: bool,
    pub accounts: Vec<String>,
    pub cluster: Option<String>,
}

/// Simulated Solana wallet.
///
/// Cloning yields another handle to the same provider.
#[derive(Clone, Debug)]
pub struct SolanaProvider {
    accounts: Arc<RwLock<AccountRegistry>>,
    chains: Arc<RwLock<ChainRegistry>>,
    name: String,
    icon: String,
    state: Arc<Mutex<SolanaState>>,
    events: EventEmitter<SolanaEvent>,
}

impl SolanaProvider {
    pub fn new(
        accounts: Arc<RwLock<AccountRegistry>>,
        chains: Arc<RwLock<ChainRegistry>>,
        name: impl Into<String>,
        icon: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            chains,
            name: name.into(),
            icon: icon.into(),
            state: Default::default(),
            events: EventEmitter::new(),
        }
    }

    /// Registration info: identity, supported chains and features, connected accounts.
    pub fn wallet(&self) -> WalletInfo {
        let chains = self.chains.read().clusters().map(|c| wallet_standard_chain(&c.id)).collect();
        let accounts = self.state.lock().accounts.clone();
        WalletInfo {
            version: WALLET_STANDARD_VERSION,
            name: self.name.clone(),
            icon: self.icon.clone(),
            chains,
            features: Feature::ALL.iter().map(Feature::name).collect(),
            accounts: self.wallet_accounts(&accounts),
        }
    }

    /// `standard:connect`. Creates a Solana account if none exists.
    pub fn connect(&self, input: ConnectInput) -> Result<ConnectOutput, RpcError> {
        let silent = input.silent || input.only_if_trusted;
        {
            let state = self.state.lock();
            if state.is_connected {
                return Ok(ConnectOutput { accounts: self.wallet_accounts(&state.accounts) });
            }
            if silent && !state.is_trusted {
                return Err(RpcError::user_rejected("the wallet has not been trusted yet"));
            }
        }

        let keys = {
            let mut registry = self.accounts.write();
            if registry.solana_public_keys().is_empty() {
                let cluster = self.chains.read().active_cluster().map(str::to_string);
                let descriptor = AccountDescriptor::solana(cluster);
                registry.create(&descriptor)?;
                debug!(target: "wallet::solana", "created an account to connect with");
            }
            registry.solana_public_keys()
        };

        {
            let mut state = self.state.lock();
            state.is_connected = true;
            state.is_trusted = true;
            state.accounts = keys.clone();
            state.cluster = self.chains.read().active_cluster().map(str::to_string);
        }
        wallet_info!("solana wallet connected with {} account(s)", keys.len());
        self.events.emit(&SolanaEvent::Change { accounts: Some(keys.clone()), chains: None });
        Ok(ConnectOutput { accounts: self.wallet_accounts(&keys) })
    }

    /// `standard:disconnect`. Trust survives a disconnect.
    pub fn disconnect(&self) {
        {
            let mut state = self.state.lock();
            if !state.is_connected {
                return;
            }
            state.is_connected = false;
            state.accounts.clear();
        }
        wallet_info!("solana wallet disconnected");
        self.events.emit(&SolanaEvent::Change { accounts: Some(Vec::new()), chains: None });
    }

    /// `solana:signTransaction`, signs every input or fails without signing any.
    pub fn sign_transaction(
        &self,
        inputs: &[SignTransactionInput],
    ) -> Result<Vec<SignTransactionOutput>, RpcError> {
        self.validate_batch(inputs.iter().map(|i| (i.account.as_str(), i.chain.as_deref())))?;
        inputs
            .iter()
            .map(|input| {
                self.with_key(&input.account, |key| {
                    let signature = key.mock_sign(&input.transaction.0);
                    SignTransactionOutput {
                        signed_transaction: signed_transaction(&signature, &input.transaction.0),
                    }
                })
            })
            .collect()
    }

    /// `solana:signMessage`.
    pub fn sign_message(&self, inputs: &[SignMessageInput]) -> Result<Vec<SignMessageOutput>, RpcError> {
        self.validate_batch(inputs.iter().map(|i| (i.account.as_str(), None)))?;
        inputs
            .iter()
            .map(|input| {
                self.with_key(&input.account, |key| SignMessageOutput {
                    signed_message: input.message.clone(),
                    signature: Bytes(key.mock_sign(&input.message.0).to_vec()),
                    signature_type: "ed25519",
                })
            })
            .collect()
    }

    /// `solana:signAndSendTransaction`. Nothing is broadcast, the signature is returned as if the
    /// transaction was submitted.
    pub fn sign_and_send_transaction(
        &self,
        inputs: &[SignAndSendTransactionInput],
    ) -> Result<Vec<SignAndSendTransactionOutput>, RpcError> {
        self.validate_batch(inputs.iter().map(|i| (i.account.as_str(), i.chain.as_deref())))?;
        let outputs = inputs
            .iter()
            .map(|input| {
                self.with_key(&input.account, |key| SignAndSendTransactionOutput {
                    signature: Bytes(key.mock_sign(&input.transaction.0).to_vec()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        wallet_info!("submitted {} solana transaction(s)", outputs.len());
        Ok(outputs)
    }

    /// Invokes a feature by its Wallet Standard name with a JSON input.
    ///
    /// Account features accept a single input object or an array of them and return an array.
    pub fn invoke(&self, feature: &str, input: Value) -> Result<Value, RpcError> {
        let parsed = feature.parse::<Feature>().map_err(|_| RpcError::method_not_supported(feature))?;
        trace!(target: "wallet::solana", %parsed, "invoking feature");
        match parsed {
            Feature::Connect => {
                let input = if input.is_null() { ConnectInput::default() } else { parse(input)? };
                to_value(self.connect(input)?)
            }
            Feature::Disconnect => {
                self.disconnect();
                Ok(Value::Null)
            }
            Feature::Events => Err(RpcError::invalid_params(
                "standard:events takes a listener and can't be invoked with a JSON input",
            )),
            Feature::SignTransaction => to_value(self.sign_transaction(&batch(input)?)?),
            Feature::SignMessage => to_value(self.sign_message(&batch(input)?)?),
            Feature::SignAndSendTransaction => {
                to_value(self.sign_and_send_transaction(&batch(input)?)?)
            }
        }
    }

    /// `standard:events` `on("change", listener)`.
    pub fn on_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SolanaEvent) + Send + Sync + 'static,
    {
        self.events.on(SolanaEventKind::Change, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn events(&self) -> &EventEmitter<SolanaEvent> {
        &self.events
    }

    /// Switches the active cluster and emits a `change` event naming the new chain.
    pub fn set_cluster(&self, cluster: &str) -> Result<(), ValidationError> {
        let name = {
            let mut chains = self.chains.write();
            chains.ensure_cluster(cluster)?;
            chains.set_active_cluster(cluster)?
        };
        let changed = {
            let mut state = self.state.lock();
            let changed = state.cluster.as_deref() != Some(name.as_str());
            state.cluster = Some(name.clone());
            changed
        };
        if changed {
            self.events.emit(&SolanaEvent::Change {
                accounts: None,
                chains: Some(vec![wallet_standard_chain(&name)]),
            });
        }
        Ok(())
    }

    /// Re-reads the account registry after it was changed from outside.
    pub fn refresh_accounts(&self) {
        let keys = self.accounts.read().solana_public_keys();
        {
            let mut state = self.state.lock();
            if !state.is_connected || state.accounts == keys {
                return;
            }
            state.accounts = keys.clone();
        }
        self.events.emit(&SolanaEvent::Change { accounts: Some(keys), chains: None });
    }

    pub fn state(&self) -> SolanaState {
        self.state.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected
    }

    /// Base58 public key of the first connected account.
    pub fn public_key(&self) -> Option<String> {
        self.state.lock().accounts.first().cloned()
    }

    /// Checks every input before anything is signed, the first unknown account fails the call.
    fn validate_batch<'a>(
        &self,
        inputs: impl ExactSizeIterator<Item = (&'a str, Option<&'a str>)>,
    ) -> Result<(), RpcError> {
        if inputs.len() == 0 {
            return Err(RpcError::invalid_params("expected at least one input"));
        }
        let state = self.state.lock();
        if !state.is_connected {
            return Err(RpcError::unauthorized("the wallet is not connected"));
        }
        let chains = self.chains.read();
        for (index, (account, chain)) in inputs.enumerate() {
            if !state.accounts.iter().any(|known| known == account) {
                return Err(RpcError::with_message(
                    ErrorCode::Unauthorized,
                    format!("unknown account at input {index}: {account}"),
                ));
            }
            if let Some(chain) = chain {
                if chains.get(ChainType::Solana, chain).is_none() {
                    return Err(RpcError::invalid_params(format!(
                        "unsupported chain at input {index}: {chain}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn with_key<T>(&self, public_key: &str, f: impl FnOnce(&SolanaKey) -> T) -> Result<T, RpcError> {
        let registry = self.accounts.read();
        let account =
            registry.find_solana(public_key).ok_or_else(|| RpcError::account_not_found(public_key))?;
        Ok(f(account.key()))
    }

    fn wallet_accounts(&self, keys: &[String]) -> Vec<WalletAccount> {
        let registry = self.accounts.read();
        keys.iter()
            .filter_map(|key| registry.find_solana(key).map(|account| (key, account)))
            .map(|(key, account)| WalletAccount {
                address: key.clone(),
                public_key: account.key().public_key_bytes().to_vec(),
                chains: account.clusters.iter().map(|c| wallet_standard_chain(c)).collect(),
                features: Feature::ALL
                    .iter()
                    .filter(|feature| feature.is_account_feature())
                    .map(Feature::name)
                    .collect(),
                label: registry
                    .iter()
                    .find(|a| a.solana().is_some_and(|s| s.public_key() == *key))
                    .map(|a| a.name.clone()),
            })
            .collect()
    }
}

/// Single signer wire layout: signature count, signature, then the unsigned payload.
fn signed_transaction(signature: &[u8; 64], transaction: &[u8]) -> Bytes {
    let mut signed = Vec::with_capacity(1 + signature.len() + transaction.len());
    signed.push(1);
    signed.extend_from_slice(signature);
    signed.extend_from_slice(transaction);
    Bytes(signed)
}

fn parse<T: DeserializeOwned>(input: Value) -> Result<T, RpcError> {
    serde_json::from_value(input).map_err(|err| RpcError::invalid_params(err.to_string()))
}

fn batch<T: DeserializeOwned>(input: Value) -> Result<Vec<T>, RpcError> {
    match input {
        Value::Array(_) => parse(input),
        single => parse(single).map(|input| vec![input]),
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::internal_error_with(err.to_string()))
}
