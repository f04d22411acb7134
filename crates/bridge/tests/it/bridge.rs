use crate::{init_tracing, open_page};
use headless_wallet::security::EnvironmentSnapshot;
use headless_wallet_bridge::{
    BridgeError, InProcessPage, MessageBridge, MessageType, message::SecurityCheckResult,
};
use headless_wallet_config::Config;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

async fn ready_bridge(config: &Config) -> (Arc<InProcessPage>, MessageBridge) {
    let page = open_page("ctx", config);
    let bridge =
        MessageBridge::new(page.clone(), config, &EnvironmentSnapshot::default()).unwrap();
    bridge.initialize(true).await.unwrap();
    (page, bridge)
}

#[tokio::test(start_paused = true)]
async fn eleventh_message_is_rate_limited() {
    init_tracing();
    let (_page, bridge) = ready_bridge(&Config::default()).await;

    for _ in 0..10 {
        bridge.heartbeat().await.unwrap();
    }
    let err = bridge.heartbeat().await.unwrap_err();
    assert!(
        matches!(err, BridgeError::RateLimited { message_type: MessageType::Heartbeat, .. }),
        "{err:?}"
    );
    assert_eq!(err.code(), "RATE_LIMITED");

    // the budget is per message type
    let check: SecurityCheckResult =
        bridge.send(MessageType::SecurityCheck, &json!({})).await.unwrap();
    assert_eq!(check.session_id, bridge.session_id());

    tokio::time::advance(Duration::from_secs(60)).await;
    bridge.heartbeat().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unanswered_message_times_out() {
    init_tracing();
    let (page, bridge) = ready_bridge(&Config::default()).await;

    page.set_unresponsive(true);
    let started = Instant::now();
    let err = bridge.heartbeat().await.unwrap_err();
    match err {
        BridgeError::Timeout { message_type, timeout } => {
            assert_eq!(message_type, MessageType::Heartbeat);
            assert_eq!(timeout, Duration::from_millis(5_000));
        }
        err => panic!("expected a timeout, got {err:?}"),
    }
    assert!(started.elapsed() >= Duration::from_millis(5_000));
    assert_eq!(bridge.pending_count(), 0);

    page.set_unresponsive(false);
    bridge.heartbeat().await.unwrap();
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn handshake_fails_on_unresponsive_page() {
    let config = Config::default();
    let page = open_page("ctx", &config);
    page.set_unresponsive(true);
    let bridge = MessageBridge::new(page.clone(), &config, &EnvironmentSnapshot::default()).unwrap();
    let err = bridge.initialize(true).await.unwrap_err();
    assert_eq!(err.code(), "HANDSHAKE_FAILED");
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test]
async fn page_errors_carry_their_code() {
    let (_page, bridge) = ready_bridge(&Config::default()).await;
    let err = bridge
        .send::<_, serde_json::Value>(MessageType::GetState, &json!({ "instanceId": "missing" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INSTANCE_NOT_FOUND");

    let err = bridge
        .send::<_, serde_json::Value>(MessageType::GetState, &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_PAYLOAD");
}

#[tokio::test]
async fn closing_the_page_rejects_pending_calls() {
    let (page, bridge) = ready_bridge(&Config::default()).await;
    page.set_unresponsive(true);
    let bridge = Arc::new(bridge);
    let call = tokio::spawn({
        let bridge = bridge.clone();
        async move { bridge.heartbeat().await }
    });
    while bridge.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    page.close();
    let err = call.await.unwrap().unwrap_err();
    assert_eq!(err.code(), "BRIDGE_CLOSED");
    assert_eq!(bridge.pending_count(), 0);
}
