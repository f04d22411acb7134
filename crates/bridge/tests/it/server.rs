use headless_wallet::{AccountDescriptor, WalletOptions, security::EnvironmentSnapshot};
use headless_wallet_bridge::{HttpPageTransport, InstallOptions, PageServer, WalletInstaller, Window};
use headless_wallet_config::Config;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread")]
async fn drives_a_page_over_http() {
    let config = Config::default();
    let window = Arc::new(Window::new(
        "http://localhost:3000/".parse().unwrap(),
        EnvironmentSnapshot::default(),
    ));
    let mut server = PageServer::new(window.clone(), config.clone());
    server.start(0).await.unwrap();
    let base = server.url().unwrap();

    // requests without the access token are refused
    let status = reqwest::Client::new()
        .post(base.join("api/message").unwrap())
        .body("{}")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, reqwest::StatusCode::FORBIDDEN);

    let transport = Arc::new(HttpPageTransport::new(base, server.token(), "page-1", "ctx"));
    let installer = WalletInstaller::new(config, EnvironmentSnapshot::default());
    let options = WalletOptions {
        accounts: vec![AccountDescriptor::evm(["1"])],
        auto_connect: Some(true),
        ..Default::default()
    };
    let wallet = installer
        .install(transport, InstallOptions::new(options).with_instance_id("w").wait_for_ready(None))
        .await
        .unwrap();
    assert!(window.ethereum().unwrap().is_connected());

    let state = wallet.switch_chain("0x89").await.unwrap();
    assert_eq!(state.evm.chain_id.as_deref(), Some("0x89"));
    wallet.heartbeat().await.unwrap();

    let summary = installer.cleanup_all().await;
    assert_eq!(summary.cleaned_up_instances, vec!["w".to_string()]);
    assert!(window.wallet_mock_instances().is_empty());

    server.stop().await.unwrap();
}
