use crate::{init_tracing, open_page};
use headless_wallet::{AccountDescriptor, AccountType, WalletOptions, security::EnvironmentSnapshot};
use headless_wallet_bridge::{InstallOptions, InstallationError, PageTransport, WalletInstaller};
use headless_wallet_config::Config;
use serde_json::json;
use similar_asserts::assert_eq;

fn installer() -> WalletInstaller {
    WalletInstaller::new(Config::default(), EnvironmentSnapshot::default())
}

fn evm_only() -> WalletOptions {
    WalletOptions { accounts: vec![AccountDescriptor::evm(["1"])], ..Default::default() }
}

#[tokio::test]
async fn duplicate_instance_ids() {
    init_tracing();
    let installer = installer();
    let page = open_page("ctx", &Config::default());

    installer
        .install(page.clone(), InstallOptions::new(evm_only()).with_instance_id("w"))
        .await
        .unwrap();
    let err = installer
        .install(page.clone(), InstallOptions::new(evm_only()).with_instance_id("w"))
        .await
        .unwrap_err();
    assert!(matches!(&err, InstallationError::DuplicateInstance(id) if id == "w"), "{err:?}");
    assert_eq!(err.code(), "INSTANCE_EXISTS");

    installer
        .install(
            page.clone(),
            InstallOptions::new(evm_only()).with_instance_id("w").override_existing(),
        )
        .await
        .unwrap();
    assert_eq!(installer.registry().len(), 1);
    assert!(installer.registry().get("w").unwrap().installation.replaced);
    assert_eq!(page.window().wallet_mock_instances(), vec!["w".to_string()]);
}

#[tokio::test]
async fn evm_only_account_on_two_chains() {
    let installer = installer();
    let page = open_page("ctx", &Config::default());
    let options: WalletOptions = serde_json::from_value(json!({
        "accounts": [{ "type": "evm_only", "evm": { "chainIds": ["1", "137"] } }],
        "autoConnect": true,
    }))
    .unwrap();

    let wallet = installer.install(page.clone(), InstallOptions::new(options)).await.unwrap();
    let state = wallet.get_state().await.unwrap();
    assert_eq!(state.evm.chain_id.as_deref(), Some("0x1"));
    assert_eq!(state.evm.network_version.as_deref(), Some("1"));
    assert!(state.evm.is_connected);
    assert_eq!(state.accounts.len(), 1);
    assert_eq!(state.accounts[0].account_type, AccountType::EvmOnly);
    assert_eq!(state.accounts[0].chain_ids, vec!["0x1".to_string(), "0x89".to_string()]);
    assert_eq!(state.evm.accounts, vec![state.accounts[0].evm_address.clone().unwrap()]);
    assert!(!state.solana.is_connected);

    let ethereum = page.window().ethereum().unwrap();
    assert_eq!(ethereum.chain_id().as_deref(), Some("0x1"));

    let state = wallet.switch_chain("137").await.unwrap();
    assert_eq!(state.evm.chain_id.as_deref(), Some("0x89"));
    assert_eq!(ethereum.chain_id().as_deref(), Some("0x89"));
}

#[tokio::test]
async fn disconnect_clears_accounts() {
    let installer = installer();
    let page = open_page("ctx", &Config::default());
    let options = WalletOptions { auto_connect: Some(true), ..evm_only() };
    let wallet = installer.install(page.clone(), InstallOptions::new(options)).await.unwrap();
    assert_eq!(wallet.get_state().await.unwrap().evm.accounts.len(), 1);

    let state = wallet.disconnect().await.unwrap();
    assert!(!state.evm.is_connected);
    assert!(state.evm.accounts.is_empty());
    assert_eq!(state.evm.selected_address, None);
    assert!(!page.window().ethereum().unwrap().is_connected());

    let state = wallet.connect().await.unwrap();
    assert_eq!(state.evm.accounts.len(), 1);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let installer = installer();
    let page = open_page("ctx", &Config::default());
    for id in ["a", "b"] {
        installer
            .install(
                page.clone(),
                InstallOptions::new(evm_only()).with_instance_id(id).with_test_id("t1"),
            )
            .await
            .unwrap();
    }
    installer
        .install(page.clone(), InstallOptions::new(evm_only()).with_instance_id("c"))
        .await
        .unwrap();

    let summary = installer.cleanup_test("t1").await;
    assert_eq!(summary.cleaned_up_instances, vec!["a".to_string(), "b".to_string()]);
    assert!(summary.is_clean());
    assert_eq!(page.window().wallet_mock_instances(), vec!["c".to_string()]);

    let again = installer.cleanup_test("t1").await;
    assert!(again.cleaned_up_instances.is_empty());
    assert!(again.is_clean());

    let summary = installer.cleanup_context("ctx").await;
    assert_eq!(summary.cleaned_up_instances, vec!["c".to_string()]);
    assert!(installer.registry().is_empty());
    assert_eq!(installer.isolation().group_count(), 0);
}

#[tokio::test]
async fn remove_unknown_instance() {
    let err = installer().remove("nope").await.unwrap_err();
    assert_eq!(err.code(), "INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn instance_limit_is_enforced() {
    let mut config = Config::default();
    config.security.max_instances = 1;
    let installer = WalletInstaller::new(config.clone(), EnvironmentSnapshot::default());
    let page = open_page("ctx", &config);
    installer.install(page.clone(), InstallOptions::new(evm_only())).await.unwrap();
    let err = installer.install(page.clone(), InstallOptions::new(evm_only())).await.unwrap_err();
    assert_eq!(err.code(), "SECURITY_VIOLATION");
}

#[tokio::test]
async fn closing_the_page_forgets_its_instances() {
    let installer = installer();
    let page = open_page("ctx", &Config::default());
    installer
        .install(page.clone(), InstallOptions::new(evm_only()).wait_for_ready(None))
        .await
        .unwrap();
    assert_eq!(installer.registry().on_page(page.page_id()).len(), 1);

    page.close();
    while !installer.registry().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(installer.isolation().group_count(), 0);
    assert!(page.window().ethereum().is_none());
}

#[tokio::test]
async fn concurrent_installs_of_one_id() {
    init_tracing();
    let installer = installer();
    let page_a = open_page("ctx", &Config::default());
    let page_b = open_page("ctx", &Config::default());

    let (a, b) = tokio::join!(
        installer.install(page_a.clone(), InstallOptions::new(evm_only()).with_instance_id("w")),
        installer.install(page_b.clone(), InstallOptions::new(evm_only()).with_instance_id("w")),
    );
    let err = match (a, b) {
        (Ok(_), Err(err)) | (Err(err), Ok(_)) => err,
        (a, b) => panic!("expected exactly one install to fail: {a:?} {b:?}"),
    };
    assert_eq!(err.code(), "INSTANCE_EXISTS");

    assert_eq!(installer.registry().ids(), vec!["w".to_string()]);
    let installed = page_a.window().instance_count() + page_b.window().instance_count();
    assert_eq!(installed, 1);
}

#[tokio::test]
async fn failed_install_releases_its_id() {
    let installer = installer();
    let page = open_page("ctx", &Config::default());
    let invalid = WalletOptions {
        accounts: vec![AccountDescriptor::evm(["not a chain"])],
        ..Default::default()
    };
    let err = installer
        .install(page.clone(), InstallOptions::new(invalid).with_instance_id("w"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(installer.registry().is_empty());

    installer
        .install(page.clone(), InstallOptions::new(evm_only()).with_instance_id("w"))
        .await
        .unwrap();
    assert_eq!(installer.registry().ids(), vec!["w".to_string()]);
}
