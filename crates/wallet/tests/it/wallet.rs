use headless_wallet::{
    AccountDescriptor, HeadlessWallet, WalletOptions, WalletUpdate, WindowEvent, WindowEventKind,
    WindowTarget, security::NetworkValidator,
};
use headless_wallet_config::WalletDefaults;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn options(value: serde_json::Value) -> WalletOptions {
    serde_json::from_value(value).unwrap()
}

#[test]
fn late_discovery_requests_are_answered() {
    let window = WindowTarget::new();
    let wallet = HeadlessWallet::new(
        &options(json!({"accounts": [{"type": "dual_chain"}], "name": "Test Wallet"})),
        &WalletDefaults::default(),
        NetworkValidator::default(),
    )
    .unwrap();
    wallet.install(&window).unwrap();
    assert!(!wallet.evm().is_connected());

    // a dapp that loads after the wallet asks for providers itself
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    window.on(WindowEventKind::AnnounceProvider, move |event| {
        if let WindowEvent::AnnounceProvider(detail) = event {
            sink.lock().push(detail.info.name.clone());
        }
    });
    let sink = Arc::clone(&names);
    window.on(WindowEventKind::RegisterWallet, move |event| {
        if let WindowEvent::RegisterWallet(solana) = event {
            sink.lock().push(solana.wallet().name);
        }
    });
    window.emit(&WindowEvent::RequestProvider);
    window.emit(&WindowEvent::AppReady);
    assert_eq!(*names.lock(), vec!["Test Wallet".to_string(), "Test Wallet".to_string()]);
}

#[test]
fn update_switches_active_account() {
    let wallet = HeadlessWallet::new(
        &options(json!({
            "accounts": [
                {"type": "evm_only", "name": "first"},
                {"type": "evm_only", "name": "second"}
            ],
            "autoConnect": true
        })),
        &WalletDefaults::default(),
        NetworkValidator::default(),
    )
    .unwrap();
    let window = WindowTarget::new();
    wallet.install(&window).unwrap();

    let second = wallet.accounts()[1].clone();
    let update = WalletUpdate { active_account: Some(second.id), ..Default::default() };
    wallet.apply(&update).unwrap();
    assert_eq!(wallet.evm().selected_address(), second.evm_address);

    let update = WalletUpdate { remove_accounts: vec![second.id], ..Default::default() };
    wallet.apply(&update).unwrap();
    assert_eq!(wallet.evm().state().accounts.len(), 1);
    assert_eq!(wallet.accounts()[0].name, "first");

    let update = WalletUpdate { connected: Some(false), ..Default::default() };
    wallet.apply(&update).unwrap();
    let snapshot = serde_json::to_value(wallet.snapshot()).unwrap();
    assert_eq!(snapshot["evm"]["isConnected"], false);
    assert_eq!(snapshot["evm"]["accounts"], json!([]));
    assert_eq!(snapshot["info"]["rdns"], "dev.headless-wallet");
}
