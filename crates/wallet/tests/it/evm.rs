use crate::init_tracing;
use headless_wallet::{
    AccountDescriptor, EvmEvent, EvmEventKind, HeadlessWallet, WalletOptions,
    security::NetworkValidator,
};
use headless_wallet_config::WalletDefaults;
use headless_wallet_rpc::request::Request;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

fn wallet(accounts: Vec<AccountDescriptor>) -> HeadlessWallet {
    let options = WalletOptions { accounts, ..Default::default() };
    HeadlessWallet::new(&options, &WalletDefaults::default(), NetworkValidator::default()).unwrap()
}

#[tokio::test]
async fn connect_flow() {
    init_tracing();
    let wallet = wallet(vec![AccountDescriptor::evm(["0x1", "0x89"]).with_private_key(DEV_KEY)]);
    let provider = wallet.evm();

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [EvmEventKind::Connect, EvmEventKind::AccountsChanged] {
        let sink = Arc::clone(&events);
        provider.on(kind, move |event: &EvmEvent| sink.lock().push(event.clone()));
    }

    assert_eq!(provider.request(Request::new("eth_accounts")).await.unwrap(), json!([]));
    let accounts = provider.request(Request::new("eth_requestAccounts")).await.unwrap();
    assert_eq!(accounts, json!([DEV_ADDRESS]));
    assert_eq!(provider.request(Request::new("eth_chainId")).await.unwrap(), json!("0x1"));
    assert_eq!(provider.request(Request::new("net_version")).await.unwrap(), json!("1"));

    let events = events.lock();
    assert!(matches!(&events[0], EvmEvent::Connect { chain_id } if chain_id == "0x1"));
    assert!(events.iter().any(
        |event| matches!(event, EvmEvent::AccountsChanged(accounts) if accounts == &[DEV_ADDRESS])
    ));
}

#[tokio::test]
async fn signing_requires_connection() {
    let wallet = wallet(vec![AccountDescriptor::evm(["1"]).with_private_key(DEV_KEY)]);
    let provider = wallet.evm();
    let sign = Request::with_params("personal_sign", vec![json!("0x68656c6c6f"), json!(DEV_ADDRESS)]);

    let err = provider.request(sign.clone()).await.unwrap_err();
    assert_eq!(err.code(), 4100);

    provider.connect().unwrap();
    let first = provider.request(sign.clone()).await.unwrap();
    let second = provider.request(sign).await.unwrap();
    assert_eq!(first, second);
    let signature = first.as_str().unwrap();
    assert!(signature.starts_with("0x"));
    assert_eq!(signature.len(), 2 + 65 * 2);
    assert!(provider.state().pending_requests.is_empty());
}

#[tokio::test]
async fn chain_management() {
    let wallet = wallet(vec![AccountDescriptor::evm(["1"])]);
    let provider = wallet.evm();
    provider.connect().unwrap();

    let changed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changed);
    provider.on(EvmEventKind::ChainChanged, move |event| {
        if let EvmEvent::ChainChanged(chain_id) = event {
            sink.lock().push(chain_id.clone());
        }
    });

    let unknown = Request::with_params("wallet_switchEthereumChain", vec![json!({"chainId": "0x2105"})]);
    assert_eq!(provider.request(unknown.clone()).await.unwrap_err().code(), 4902);

    let add = Request::with_params(
        "wallet_addEthereumChain",
        vec![json!({
            "chainId": "0x2105",
            "chainName": "Base",
            "rpcUrls": ["https://mainnet.base.org"],
            "nativeCurrency": {"name": "Ether", "symbol": "ETH", "decimals": 18}
        })],
    );
    assert_eq!(provider.request(add).await.unwrap(), Value::Null);
    assert_eq!(provider.chain_id().as_deref(), Some("0x2105"));
    assert_eq!(provider.state().network_version.as_deref(), Some("8453"));

    provider
        .request(Request::with_params("wallet_switchEthereumChain", vec![json!({"chainId": "0x1"})]))
        .await
        .unwrap();
    similar_asserts::assert_eq!(*changed.lock(), vec!["0x2105".to_string(), "0x1".to_string()]);
}

#[tokio::test]
async fn rejects_unsafe_rpc_urls() {
    let wallet = wallet(vec![AccountDescriptor::evm(["1"])]);
    let add = Request::with_params(
        "wallet_addEthereumChain",
        vec![json!({
            "chainId": "0x539",
            "chainName": "Metadata",
            "rpcUrls": ["http://169.254.169.254/latest"]
        })],
    );
    let err = wallet.evm().request(add).await.unwrap_err();
    assert_eq!(err.code(), -32602);
    assert_eq!(wallet.evm().chain_id().as_deref(), Some("0x1"));
}

#[tokio::test]
async fn legacy_methods() {
    let wallet = wallet(vec![AccountDescriptor::evm(["1"])]);
    let provider = wallet.evm();
    assert_eq!(provider.request(Request::new("eth_getCompilers")).await.unwrap(), json!([]));
    assert_eq!(provider.request(Request::new("eth_mining")).await.unwrap(), json!(false));
    let err = provider.request(Request::new("shh_version")).await.unwrap_err();
    assert_eq!(err.code(), 4200);
    let err = provider.request(Request::new("eth_unknownThing")).await.unwrap_err();
    assert_eq!(err.code(), -32601);
}

#[tokio::test]
async fn permissions_follow_connection() {
    let wallet = wallet(vec![AccountDescriptor::evm(["1"])]);
    let provider = wallet.evm();
    let granted = provider
        .request(Request::with_params("wallet_requestPermissions", vec![json!({"eth_accounts": {}})]))
        .await
        .unwrap();
    assert_eq!(granted[0]["parentCapability"], "eth_accounts");
    assert!(provider.is_connected());

    provider
        .request(Request::with_params("wallet_revokePermissions", vec![json!({"eth_accounts": {}})]))
        .await
        .unwrap();
    assert!(!provider.is_connected());
    assert_eq!(provider.request(Request::new("wallet_getPermissions")).await.unwrap(), json!([]));
}
