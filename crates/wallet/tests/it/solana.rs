use headless_wallet::{
    AccountDescriptor, HeadlessWallet, SolanaEvent, WalletOptions, security::NetworkValidator,
    solana::ConnectInput,
};
use headless_wallet_config::WalletDefaults;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn wallet(accounts: Vec<AccountDescriptor>) -> HeadlessWallet {
    let options = WalletOptions { accounts, ..Default::default() };
    HeadlessWallet::new(&options, &WalletDefaults::default(), NetworkValidator::default()).unwrap()
}

#[test]
fn silent_connect_needs_trust() {
    let wallet = wallet(vec![AccountDescriptor::solana(["devnet"])]);
    let provider = wallet.solana();

    let silent = ConnectInput { silent: true, ..Default::default() };
    assert_eq!(provider.connect(silent.clone()).unwrap_err().code(), 4001);

    let output = provider.connect(ConnectInput::default()).unwrap();
    assert_eq!(output.accounts.len(), 1);
    assert_eq!(output.accounts[0].chains, vec!["solana:devnet".to_string()]);

    provider.disconnect();
    assert!(!provider.is_connected());
    provider.connect(silent).unwrap();
    assert!(provider.is_connected());
}

#[test]
fn sign_message_through_features() {
    let wallet = wallet(vec![AccountDescriptor::solana(["devnet"])]);
    let provider = wallet.solana();

    let changes = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&changes);
    provider.on_change(move |event| {
        let SolanaEvent::Change { accounts, .. } = event;
        if accounts.is_some() {
            *sink.lock() += 1;
        }
    });

    provider.invoke("standard:connect", json!(null)).unwrap();
    let account = provider.public_key().unwrap();
    let signed = provider
        .invoke("solana:signMessage", json!({"account": account, "message": [104, 105]}))
        .unwrap();
    assert_eq!(signed[0]["signedMessage"], json!([104, 105]));
    assert_eq!(signed[0]["signatureType"], "ed25519");
    assert_eq!(signed[0]["signature"].as_array().unwrap().len(), 64);

    let err = provider
        .invoke("solana:signMessage", json!([{"account": "11111111111111111111111111111111", "message": [1]}]))
        .unwrap_err();
    assert_eq!(err.code(), 4100);

    provider.invoke("standard:disconnect", json!(null)).unwrap();
    assert_eq!(*changes.lock(), 2);
}

#[test]
fn signed_transaction_layout() {
    let wallet = wallet(vec![AccountDescriptor::solana(["devnet"])]);
    let provider = wallet.solana();
    provider.connect(ConnectInput::default()).unwrap();
    let account = provider.public_key().unwrap();

    let signed = provider
        .invoke(
            "solana:signTransaction",
            json!({"account": account, "transaction": [7, 7, 7], "chain": "solana:devnet"}),
        )
        .unwrap();
    let bytes = signed[0]["signedTransaction"].as_array().unwrap();
    assert_eq!(bytes.len(), 1 + 64 + 3);
    assert_eq!(bytes[0], 1);
    assert_eq!(&bytes[65..], &[json!(7), json!(7), json!(7)]);

    let err = provider
        .invoke(
            "solana:signTransaction",
            json!({"account": account, "transaction": [7], "chain": "solana:mainnet"}),
        )
        .unwrap_err();
    assert_eq!(err.code(), -32602);
}
