//! EIP-1193 provider.

use crate::{
    accounts::{AccountRegistry, EvmKey},
    chains::{Chain, ChainRegistry, ChainType, chain_id_to_decimal, normalize_chain_id},
    error::ValidationError,
    events::{EventEmitter, EvmEvent, EvmEventKind, ListenerId},
    macros::wallet_info,
    security::NetworkValidator,
    state::{
        Lifecycle, PendingRequest, ProviderState, ProviderStateStore, StateKey, StateNotification,
        StateValue,
    },
};
use alloy_primitives::hex;
use headless_wallet_rpc::{
    error::RpcError,
    request::Request,
    response::{ResponseResult, ToRpcResponseResult},
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

pub mod legacy;
pub mod request;
pub mod signer;

use legacy::{LegacyOutcome, LegacyShim};
use request::{AddChainParams, EvmRequest, TransactionParams, WatchAssetParams, is_address};

/// Reported by `web3_clientVersion`.
pub const CLIENT_VERSION: &str = concat!("HeadlessWallet/v", env!("CARGO_PKG_VERSION"));

/// The only permission the provider grants.
pub const ETH_ACCOUNTS_PERMISSION: &str = "eth_accounts";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// EIP-2255 permission object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub parent_capability: String,
    pub caveats: Vec<Caveat>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Caveat {
    #[serde(rename = "type")]
    pub caveat_type: String,
    pub value: Value,
}

/// Simulated EIP-1193 provider backed by the shared account and chain registries.
///
/// Cloning yields another handle to the same provider.
#[derive(Clone, Debug)]
pub struct EvmProvider {
    accounts: Arc<RwLock<AccountRegistry>>,
    chains: Arc<RwLock<ChainRegistry>>,
    state: ProviderStateStore,
    events: EventEmitter<EvmEvent>,
    legacy: Arc<LegacyShim>,
    status: Arc<RwLock<ConnectionStatus>>,
    disconnect_reason: Arc<Mutex<Option<RpcError>>>,
    network: NetworkValidator,
    nonce: Arc<AtomicU64>,
}

impl EvmProvider {
    pub fn new(
        accounts: Arc<RwLock<AccountRegistry>>,
        chains: Arc<RwLock<ChainRegistry>>,
        network: NetworkValidator,
    ) -> Self {
        let chain_id = chains.read().active_chain_id().map(str::to_string);
        let state = ProviderStateStore::new(chain_id);
        let events = EventEmitter::new();
        let disconnect_reason: Arc<Mutex<Option<RpcError>>> = Default::default();

        let emitter = events.clone();
        let reason = Arc::clone(&disconnect_reason);
        // registered for the lifetime of the state store
        let _ = state.subscribe(move |notification| emit_events(&emitter, &reason, notification));

        Self {
            accounts,
            chains,
            state,
            events,
            legacy: Default::default(),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            disconnect_reason,
            network,
            nonce: Default::default(),
        }
    }

    /// EIP-1193 `request`.
    pub async fn request(&self, request: Request) -> Result<Value, RpcError> {
        self.execute(request).await.into_result()
    }

    /// Executes the request and returns the outcome as a [`ResponseResult`].
    pub async fn execute(&self, request: Request) -> ResponseResult {
        trace!(target: "wallet::evm", method = %request.method, "executing request");
        let response = match EvmRequest::parse(&request, &self.legacy) {
            Ok(req) => self.dispatch(req),
            Err(err) => ResponseResult::Error(err),
        };
        if let ResponseResult::Error(err) = &response {
            debug!(target: "wallet::evm", method = %request.method, %err, "request failed");
        }
        response
    }

    fn dispatch(&self, request: EvmRequest) -> ResponseResult {
        if request.requires_connection() && !self.is_connected() {
            return ResponseResult::Error(RpcError::unauthorized(
                "the requested account and/or method has not been authorized by the user",
            ));
        }
        match request {
            EvmRequest::RequestAccounts => self.connect().to_rpc_result(),
            EvmRequest::Accounts => ResponseResult::success(self.state.accounts()),
            EvmRequest::ChainId => ResponseResult::success(self.chain_id()),
            EvmRequest::NetVersion => ResponseResult::success(self.state.network_version()),
            EvmRequest::Coinbase => ResponseResult::success(self.state.selected_address()),
            EvmRequest::ClientVersion => ResponseResult::success(CLIENT_VERSION),
            EvmRequest::SwitchChain(params) => {
                self.switch_chain(&params.chain_id).map(|()| Value::Null).to_rpc_result()
            }
            EvmRequest::AddChain(params) => self.add_chain(params).map(|()| Value::Null).to_rpc_result(),
            EvmRequest::RequestPermissions(requested) => {
                self.request_permissions(&requested).to_rpc_result()
            }
            EvmRequest::GetPermissions => ResponseResult::success(self.permissions()),
            EvmRequest::RevokePermissions(revoked) => {
                self.revoke_permissions(&revoked).map(|()| Value::Null).to_rpc_result()
            }
            EvmRequest::WatchAsset(params) => self.watch_asset(&params).to_rpc_result(),
            EvmRequest::PersonalSign { message, address } => self
                .track("personal_sign", || {
                    self.with_key(&address, |key| signer::personal_sign(key, &message))
                })
                .to_rpc_result(),
            EvmRequest::EthSign { address, message } => {
                self.legacy.warn_once("eth_sign", "handled as personal_sign");
                self.track("eth_sign", || {
                    self.with_key(&address, |key| signer::personal_sign(key, &message))
                })
                .to_rpc_result()
            }
            EvmRequest::SignTypedData { address, data } => self
                .track("eth_signTypedData_v4", || self.sign_typed_data(&address, &data))
                .to_rpc_result(),
            EvmRequest::SendTransaction(tx) => {
                self.track("eth_sendTransaction", || self.send_transaction(tx)).to_rpc_result()
            }
            EvmRequest::Legacy(LegacyOutcome::Stub(value)) => ResponseResult::Success(value),
            EvmRequest::Legacy(LegacyOutcome::Reject(err)) => ResponseResult::Error(err),
            EvmRequest::Legacy(LegacyOutcome::Redirect(target)) => {
                ResponseResult::Error(RpcError::internal_error_with(format!(
                    "unresolved redirect to {target}"
                )))
            }
        }
    }

    /// Connects and exposes the accounts, active account first. Idempotent once connected.
    pub fn connect(&self) -> Result<Vec<String>, RpcError> {
        if self.is_connected() {
            return Ok(self.state.accounts());
        }
        let addresses = self.accounts.read().evm_addresses();
        if addresses.is_empty() {
            return Err(RpcError::unauthorized("no EVM accounts available"));
        }

        self.set_status(ConnectionStatus::Connecting);
        let mut permissions = self.state.permissions();
        permissions.insert(ETH_ACCOUNTS_PERMISSION.to_string());
        self.state.batch_set([
            (StateKey::IsConnected, StateValue::Flag(true)),
            (StateKey::Accounts, StateValue::Accounts(addresses.clone())),
            (StateKey::Permissions, StateValue::Permissions(permissions)),
        ]);
        self.set_status(ConnectionStatus::Connected);
        wallet_info!("connected {} account(s) on chain {:?}", addresses.len(), self.chain_id());
        Ok(addresses)
    }

    /// Disconnects with the EIP-1193 `4900` error.
    pub fn disconnect(&self) {
        self.disconnect_with(RpcError::disconnected());
    }

    /// Disconnects, `error` is handed to the `disconnect` listeners.
    pub fn disconnect_with(&self, error: RpcError) {
        if !self.is_connected() {
            return;
        }
        *self.disconnect_reason.lock() = Some(error);
        self.set_status(ConnectionStatus::Disconnected);
        let mut permissions = self.state.permissions();
        permissions.remove(ETH_ACCOUNTS_PERMISSION);
        self.state.batch_set([
            (StateKey::IsConnected, StateValue::Flag(false)),
            (StateKey::Permissions, StateValue::Permissions(permissions)),
        ]);
        wallet_info!("disconnected");
    }

    /// Makes the `index`th EVM account active. While connected this emits `accountsChanged`.
    pub fn switch_account(&self, index: usize) -> Result<Vec<String>, ValidationError> {
        self.accounts.write().set_active_evm(index)?;
        let addresses = self.accounts.read().evm_addresses();
        if self.is_connected() {
            self.state.batch_set([
                (StateKey::Accounts, StateValue::Accounts(addresses.clone())),
                (StateKey::SelectedAddress, StateValue::Text(addresses.first().cloned())),
            ]);
        }
        Ok(addresses)
    }

    /// Re-reads the account registry after it was changed from outside.
    pub fn refresh_accounts(&self) {
        if !self.is_connected() {
            return;
        }
        let addresses = self.accounts.read().evm_addresses();
        if addresses.is_empty() {
            self.disconnect();
            return;
        }
        self.state.batch_set([
            (StateKey::Accounts, StateValue::Accounts(addresses.clone())),
            (StateKey::SelectedAddress, StateValue::Text(addresses.first().cloned())),
        ]);
    }

    /// Switches to a registered chain and emits exactly one `chainChanged`, also when the chain
    /// already was the active one.
    pub fn switch_chain(&self, chain_id: &str) -> Result<(), RpcError> {
        let id = self.chains.write().set_active_chain(chain_id)?;
        if self.state.set(StateKey::ChainId, StateValue::Text(Some(id.clone()))).changes.is_empty() {
            // the store only notifies on changes
            self.events.emit(&EvmEvent::ChainChanged(id));
            return Ok(());
        }
        wallet_info!("switched to chain {id}");
        Ok(())
    }

    /// Registers a new chain and switches to it, known chains are switched to right away.
    fn add_chain(&self, params: AddChainParams) -> Result<(), RpcError> {
        let chain_id = params.chain_id.as_deref().ok_or(ValidationError::MissingField("chainId"))?;
        let id = normalize_chain_id(chain_id)?;
        if self.chains.read().get(ChainType::Evm, &id).is_some() {
            return self.switch_chain(&id);
        }

        let name = params
            .chain_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(ValidationError::MissingField("chainName"))?;
        let rpc_urls = params
            .rpc_urls
            .filter(|urls| !urls.is_empty())
            .ok_or(ValidationError::MissingField("rpcUrls"))?;
        for url in rpc_urls.iter().chain(params.block_explorer_urls.iter().flatten()) {
            self.network.validate(url)?;
        }
        if let Some(currency) = &params.native_currency {
            if currency.symbol.is_empty() || currency.symbol.len() > 6 {
                return Err(RpcError::invalid_params(
                    "nativeCurrency.symbol must be between 1 and 6 characters",
                ));
            }
        }

        self.chains.write().register(Chain::evm(&id, name).with_rpc_url(&rpc_urls[0]))?;
        wallet_info!("added chain {id}");
        self.switch_chain(&id)
    }

    fn request_permissions(&self, requested: &Map<String, Value>) -> Result<Vec<Permission>, RpcError> {
        if requested.is_empty() {
            return Err(RpcError::invalid_params("expected at least one permission"));
        }
        if let Some(unsupported) = requested.keys().find(|key| *key != ETH_ACCOUNTS_PERMISSION) {
            return Err(RpcError::invalid_params(format!("unsupported permission `{unsupported}`")));
        }
        self.connect()?;
        Ok(self.permissions())
    }

    fn revoke_permissions(&self, revoked: &Map<String, Value>) -> Result<(), RpcError> {
        if revoked.contains_key(ETH_ACCOUNTS_PERMISSION) {
            self.disconnect();
        }
        Ok(())
    }

    /// Currently granted permissions.
    pub fn permissions(&self) -> Vec<Permission> {
        if !self.state.permissions().contains(ETH_ACCOUNTS_PERMISSION) {
            return Vec::new();
        }
        vec![Permission {
            parent_capability: ETH_ACCOUNTS_PERMISSION.to_string(),
            caveats: vec![Caveat {
                caveat_type: "restrictReturnedAccounts".to_string(),
                value: Value::from(self.state.accounts()),
            }],
        }]
    }

    fn watch_asset(&self, params: &WatchAssetParams) -> Result<bool, RpcError> {
        if !["ERC20", "ERC721", "ERC1155"].iter().any(|t| params.asset_type.eq_ignore_ascii_case(t)) {
            return Err(RpcError::invalid_params(format!(
                "unsupported asset type `{}`",
                params.asset_type
            )));
        }
        if !is_address(&params.options.address) {
            return Err(RpcError::invalid_params(format!(
                "invalid asset address `{}`",
                params.options.address
            )));
        }
        wallet_info!("watching asset {}", params.options.address);
        Ok(true)
    }

    fn sign_typed_data(&self, address: &str, data: &Value) -> Result<String, RpcError> {
        let Some(object) = data.as_object() else {
            return Err(RpcError::invalid_params("typed data must be an object"));
        };
        for field in ["types", "primaryType", "domain", "message"] {
            if !object.contains_key(field) {
                return Err(RpcError::invalid_params(format!("typed data is missing `{field}`")));
            }
        }
        if let Some(domain_chain) = object["domain"].get("chainId") {
            let domain_chain = match domain_chain {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.clone(),
                _ => return Err(RpcError::invalid_params("invalid domain chainId")),
            };
            self.ensure_active_chain(&domain_chain)?;
        }
        self.with_key(address, |key| signer::sign_typed_data(key, data))
    }

    fn send_transaction(&self, tx: TransactionParams) -> Result<String, RpcError> {
        if let Some(to) = &tx.to {
            if !is_address(to) {
                return Err(RpcError::invalid_params(format!("invalid `to` address `{to}`")));
            }
        }
        if let Some(value) = &tx.value {
            let valid = value
                .strip_prefix("0x")
                .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit()));
            if !valid {
                return Err(RpcError::invalid_params(format!("invalid `value` quantity `{value}`")));
            }
        }
        if let Some(chain_id) = &tx.chain_id {
            self.ensure_active_chain(chain_id)?;
        }
        let chain_id = self.chain_id().unwrap_or_default();
        let from = tx.from.clone();
        let tx = serde_json::to_value(tx).map_err(|err| RpcError::internal_error_with(err.to_string()))?;
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let hash = self.with_key(&from, |_| signer::transaction_hash(&chain_id, &tx, nonce))?;
        wallet_info!("submitted transaction {hash} from {from}");
        Ok(hex::encode_prefixed(hash))
    }

    fn ensure_active_chain(&self, chain_id: &str) -> Result<(), RpcError> {
        let requested = chain_id_to_decimal(chain_id)?;
        let active = self.chain_id().and_then(|id| chain_id_to_decimal(&id).ok());
        if active.as_deref() != Some(requested.as_str()) {
            return Err(RpcError::invalid_params(format!(
                "provided chainId \"{requested}\" must match the active chainId \"{}\"",
                active.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn with_key<T>(&self, address: &str, f: impl FnOnce(&EvmKey) -> T) -> Result<T, RpcError> {
        let accounts = self.accounts.read();
        let account = accounts.find_evm(address).ok_or_else(|| RpcError::account_not_found(address))?;
        Ok(f(account.key()))
    }

    /// Records the request as pending while `f` runs.
    fn track<T>(&self, method: &str, f: impl FnOnce() -> Result<T, RpcError>) -> Result<T, RpcError> {
        let id = Uuid::new_v4().to_string();
        let mut pending = self.state.pending_requests();
        pending.insert(
            id.clone(),
            PendingRequest { id: id.clone(), method: method.to_string(), created_at: now_millis() },
        );
        self.state.set(StateKey::PendingRequests, StateValue::Pending(pending));

        let result = f();

        let mut pending = self.state.pending_requests();
        pending.remove(&id);
        self.state.set(StateKey::PendingRequests, StateValue::Pending(pending));
        result
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn chain_id(&self) -> Option<String> {
        self.state.chain_id()
    }

    pub fn selected_address(&self) -> Option<String> {
        self.state.selected_address()
    }

    pub fn state(&self) -> ProviderState {
        self.state.snapshot()
    }

    pub fn state_store(&self) -> &ProviderStateStore {
        &self.state
    }

    pub fn legacy(&self) -> &LegacyShim {
        &self.legacy
    }

    pub fn events(&self) -> &EventEmitter<EvmEvent> {
        &self.events
    }

    pub fn on<F>(&self, kind: EvmEventKind, listener: F) -> ListenerId
    where
        F: Fn(&EvmEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn once<F>(&self, kind: EvmEventKind, listener: F) -> ListenerId
    where
        F: Fn(&EvmEvent) + Send + Sync + 'static,
    {
        self.events.once(kind, listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }
}

/// Translates a state update into provider events: lifecycle first, then `chainChanged`, then
/// `accountsChanged`.
fn emit_events(
    events: &EventEmitter<EvmEvent>,
    disconnect_reason: &Mutex<Option<RpcError>>,
    notification: &StateNotification,
) {
    match &notification.lifecycle {
        Some(Lifecycle::Connected { chain_id }) => {
            events.emit(&EvmEvent::Connect { chain_id: chain_id.clone().unwrap_or_default() });
        }
        Some(Lifecycle::Disconnected) => {
            let error = disconnect_reason.lock().take().unwrap_or_else(RpcError::disconnected);
            events.emit(&EvmEvent::Disconnect(error));
        }
        None => {}
    }
    if let Some(StateValue::Text(Some(chain_id))) = notification.changed(StateKey::ChainId) {
        events.emit(&EvmEvent::ChainChanged(chain_id.clone()));
    }
    if let Some(StateValue::Accounts(accounts)) = notification.changed(StateKey::Accounts) {
        events.emit(&EvmEvent::AccountsChanged(accounts.clone()));
    }
}

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accounts::AccountDescriptor, events::WalletEvent};
    use headless_wallet_rpc::error::ErrorCode;
    use serde_json::json;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn provider(descriptors: &[AccountDescriptor]) -> EvmProvider {
        let mut registry = AccountRegistry::default();
        registry.create_many(descriptors).unwrap();
        let mut chains = ChainRegistry::new();
        for info in registry.list() {
            for id in &info.chain_ids {
                chains.ensure_evm_chain(id).unwrap();
            }
        }
        let first = chains.evm_chains().next().map(|chain| chain.id.clone()).unwrap();
        chains.set_active_chain(&first).unwrap();
        EvmProvider::new(
            Arc::new(RwLock::new(registry)),
            Arc::new(RwLock::new(chains)),
            NetworkValidator::default(),
        )
    }

    fn record(provider: &EvmProvider) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EvmEventKind::Connect,
            EvmEventKind::Disconnect,
            EvmEventKind::AccountsChanged,
            EvmEventKind::ChainChanged,
        ] {
            let sink = Arc::clone(&seen);
            provider.on(kind, move |event| sink.lock().push(event.kind().name().to_string()));
        }
        seen
    }

    #[tokio::test]
    async fn connect_emits_connect_then_accounts_changed() {
        let provider = provider(&[AccountDescriptor::evm(["1", "137"]).with_private_key(DEV_KEY)]);
        let seen = record(&provider);

        assert_eq!(provider.request(Request::new("eth_accounts")).await.unwrap(), json!([]));
        let accounts = provider.request(Request::new("eth_requestAccounts")).await.unwrap();
        assert_eq!(accounts, json!([DEV_ADDRESS]));
        // idempotent once connected
        provider.request(Request::new("eth_requestAccounts")).await.unwrap();

        assert_eq!(*seen.lock(), vec!["connect", "accountsChanged"]);
        assert_eq!(provider.status(), ConnectionStatus::Connected);
        assert_eq!(provider.request(Request::new("eth_chainId")).await.unwrap(), json!("0x1"));
        assert_eq!(provider.request(Request::new("net_version")).await.unwrap(), json!("1"));
        assert_eq!(provider.request(Request::new("eth_coinbase")).await.unwrap(), json!(DEV_ADDRESS));
    }

    #[tokio::test]
    async fn switch_chain() {
        let provider = provider(&[AccountDescriptor::evm(["1", "137"])]);
        let seen = record(&provider);

        let res = provider
            .request(Request::with_params("wallet_switchEthereumChain", vec![json!({"chainId": "0x89"})]))
            .await
            .unwrap();
        assert_eq!(res, Value::Null);
        assert_eq!(*seen.lock(), vec!["chainChanged"]);
        assert_eq!(provider.chain_id().as_deref(), Some("0x89"));

        let err = provider
            .request(Request::with_params("wallet_switchEthereumChain", vec![json!({"chainId": "0x539"})]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 4902);
        assert_eq!(provider.chain_id().as_deref(), Some("0x89"));
    }

    #[tokio::test]
    async fn switching_to_the_active_chain_still_notifies() {
        let provider = provider(&[AccountDescriptor::evm(["1", "137"])]);
        let chains = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&chains);
        provider.on(EvmEventKind::ChainChanged, move |event| {
            if let EvmEvent::ChainChanged(id) = event {
                sink.lock().push(id.clone());
            }
        });

        let switch = |id: &str| {
            Request::with_params("wallet_switchEthereumChain", vec![json!({ "chainId": id })])
        };
        provider.request(switch("0x1")).await.unwrap();
        assert_eq!(*chains.lock(), vec!["0x1".to_string()]);

        provider.request(switch("0x89")).await.unwrap();
        provider.request(switch("0x89")).await.unwrap();
        assert_eq!(*chains.lock(), vec!["0x1".to_string(), "0x89".to_string(), "0x89".to_string()]);

        // adding a known chain switches to it
        let known = json!({"chainId": "0x1", "chainName": "Ethereum", "rpcUrls": ["https://rpc.example"]});
        provider.request(Request::with_params("wallet_addEthereumChain", vec![known])).await.unwrap();
        assert_eq!(chains.lock().len(), 4);
        assert_eq!(provider.chain_id().as_deref(), Some("0x1"));
    }

    #[tokio::test]
    async fn add_chain_registers_and_switches() {
        let provider = provider(&[AccountDescriptor::evm(["1"])]);
        let params = json!({
            "chainId": "0x539",
            "chainName": "Dev",
            "rpcUrls": ["http://localhost:8545"],
            "nativeCurrency": {"name": "Ether", "symbol": "ETH", "decimals": 18}
        });
        provider.request(Request::with_params("wallet_addEthereumChain", vec![params])).await.unwrap();
        assert_eq!(provider.chain_id().as_deref(), Some("0x539"));

        let blocked = json!({"chainId": "0x53a", "chainName": "Meta", "rpcUrls": ["http://169.254.169.254"]});
        let err = provider
            .request(Request::with_params("wallet_addEthereumChain", vec![blocked]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);

        let missing = json!({"chainId": "0x53b", "rpcUrls": ["https://rpc.example"]});
        let err = provider
            .request(Request::with_params("wallet_addEthereumChain", vec![missing]))
            .await
            .unwrap_err();
        assert!(err.message.contains("chainName"));
        assert_eq!(provider.chain_id().as_deref(), Some("0x539"));
    }

    #[tokio::test]
    async fn signing_requires_connection_and_known_account() {
        let provider = provider(&[AccountDescriptor::evm(["1"]).with_private_key(DEV_KEY)]);
        let sign = |address: &str| {
            Request::with_params("personal_sign", vec![json!("0x68656c6c6f"), json!(address)])
        };
        let err = provider.request(sign(DEV_ADDRESS)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);

        provider.connect().unwrap();
        let signature = provider.request(sign(&DEV_ADDRESS.to_uppercase().replacen("0X", "0x", 1))).await.unwrap();
        assert_eq!(signature.as_str().unwrap().len(), 132);
        assert_eq!(provider.request(sign(DEV_ADDRESS)).await.unwrap(), signature);

        let err = provider.request(sign("0x0000000000000000000000000000000000000001")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert!(err.message.contains("not found"));
        assert!(provider.state().pending_requests.is_empty());
    }

    #[tokio::test]
    async fn typed_data_chain_must_match() {
        let provider = provider(&[AccountDescriptor::evm(["1"]).with_private_key(DEV_KEY)]);
        provider.connect().unwrap();
        let data = |chain_id: u64| {
            json!({
                "types": {"EIP712Domain": []},
                "primaryType": "EIP712Domain",
                "domain": {"chainId": chain_id},
                "message": {}
            })
        };
        provider
            .request(Request::with_params("eth_signTypedData_v4", vec![json!(DEV_ADDRESS), data(1)]))
            .await
            .unwrap();
        let err = provider
            .request(Request::with_params("eth_signTypedData_v4", vec![json!(DEV_ADDRESS), data(137)]))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParams);
    }

    #[tokio::test]
    async fn send_transaction_returns_unique_hashes() {
        let provider = provider(&[AccountDescriptor::evm(["1"]).with_private_key(DEV_KEY)]);
        provider.connect().unwrap();
        let tx = json!({"from": DEV_ADDRESS, "to": DEV_ADDRESS, "value": "0x1"});
        let a = provider.request(Request::with_params("eth_sendTransaction", vec![tx.clone()])).await.unwrap();
        let b = provider.request(Request::with_params("eth_sendTransaction", vec![tx])).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str().unwrap().len(), 66);
    }

    #[tokio::test]
    async fn switch_account_reorders() {
        let provider = provider(&[
            AccountDescriptor::evm(["1"]),
            AccountDescriptor::evm(["1"]),
            AccountDescriptor::evm(["1"]),
        ]);
        let original = provider.connect().unwrap();
        let seen = record(&provider);

        provider.switch_account(1).unwrap();
        let accounts = provider.request(Request::new("eth_accounts")).await.unwrap();
        assert_eq!(accounts, json!([original[1], original[0], original[2]]));
        assert_eq!(provider.selected_address().as_deref(), Some(original[1].as_str()));
        assert_eq!(*seen.lock(), vec!["accountsChanged"]);
    }

    #[tokio::test]
    async fn disconnect_fires_once() {
        let provider = provider(&[AccountDescriptor::evm(["1"])]);
        provider.connect().unwrap();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        provider.on(EvmEventKind::Disconnect, move |event| {
            assert!(matches!(event, EvmEvent::Disconnect(err) if err.code() == 4900));
            *sink.lock() += 1;
        });
        provider.disconnect();
        provider.disconnect();
        assert_eq!(*count.lock(), 1);
        assert!(provider.state().accounts.is_empty());
        assert!(provider.permissions().is_empty());
    }

    #[tokio::test]
    async fn permissions() {
        let provider = provider(&[AccountDescriptor::evm(["1"])]);
        let res = provider
            .request(Request::with_params("wallet_requestPermissions", vec![json!({"eth_accounts": {}})]))
            .await
            .unwrap();
        assert_eq!(res[0]["parentCapability"], "eth_accounts");
        assert!(provider.is_connected());

        provider
            .request(Request::with_params("wallet_revokePermissions", vec![json!({"eth_accounts": {}})]))
            .await
            .unwrap();
        assert!(!provider.is_connected());
        assert_eq!(provider.request(Request::new("wallet_getPermissions")).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn legacy_methods() {
        let provider = provider(&[AccountDescriptor::evm(["1"])]);
        assert_eq!(provider.request(Request::new("eth_mining")).await.unwrap(), json!(false));
        let err = provider.request(Request::new("shh_version")).await.unwrap_err();
        assert_eq!(err.code(), 4200);
        let err = provider.request(Request::new("eth_getBalance")).await.unwrap_err();
        assert_eq!(err.code(), -32601);
        assert_eq!(provider.legacy().warned(), vec!["eth_mining", "shh_version"]);
    }
}
