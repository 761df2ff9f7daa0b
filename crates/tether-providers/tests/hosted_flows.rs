//! Hosted (platform-managed) flow contract: a `Result` that errs on timeout
//! and resolves when the sentinel message arrives

use std::sync::Arc;
use std::time::Duration;

use tether_config::PlatformConfig;
use tether_oauth::{FlowManager, MSG_CONNECT_COMPLETE};
use tether_providers::{redirect_to_tether_connect, redirect_to_tether_edit};
use tether_types::ProviderKind;

fn quiet_manager(timeout_secs: i64) -> FlowManager {
    FlowManager::with_launcher(Arc::new(|_| Ok(())))
        .with_timings(Duration::from_millis(50), timeout_secs)
}

#[tokio::test]
async fn hosted_connect_times_out_with_no_message() {
    let manager = quiet_manager(1);
    let config = PlatformConfig::new("jwt-1", "org-1");

    let err = redirect_to_tether_connect(
        &manager,
        &config,
        "ott-1",
        ProviderKind::GoogleDrive,
        "http://127.0.0.1:0/callback",
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "OAUTH_ERROR");
    assert!(err.message().contains("timed out"));

    // Teardown released the surface and the slot
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(manager.active_flow().is_none());
}

#[tokio::test]
async fn hosted_flow_rejects_invalid_platform_config() {
    let manager = quiet_manager(30);
    let config = PlatformConfig::new("", "org-1");

    let err = redirect_to_tether_edit(
        &manager,
        &config,
        "ott-1",
        ProviderKind::Notion,
        "http://127.0.0.1:0/callback",
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "CONFIGURATION_ERROR");
    assert!(manager.active_flow().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn hosted_connect_resolves_on_completion_sentinel() {
    let config = PlatformConfig::new("jwt-1", "org-1");

    // Drive the flow from a second task: once the hosted page would be
    // open, post the completion sentinel from the platform origin
    let poster = tokio::spawn(async move {
        let client = reqwest::Client::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let response = client
                .post("http://127.0.0.1:8494/surface/message")
                .header("Origin", "https://platform.tether.dev")
                .json(&serde_json::json!({ "message": MSG_CONNECT_COMPLETE }))
                .send()
                .await;
            if matches!(&response, Ok(r) if r.status().as_u16() == 204) {
                return;
            }
        }
        panic!("surface message endpoint never accepted the sentinel");
    });

    redirect_to_tether_connect(
        &quiet_manager(30),
        &config,
        "ott-2",
        ProviderKind::Dropbox,
        "http://127.0.0.1:8494/callback",
    )
    .await
    .unwrap();

    poster.await.unwrap();
}
