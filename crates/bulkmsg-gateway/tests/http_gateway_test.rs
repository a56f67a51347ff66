use std::time::Duration;

use anyhow::Result;
use bulkmsg_core::{
    domain::{DeviceId, DeviceStatus, OrganizationId},
    errors::Error,
    ports::{GatewayPort, HistoryQuery, MediaMessage, NotificationRecord, NotificationStore, TextMessage},
};
use bulkmsg_gateway::HttpGateway;
use httpmock::prelude::*;
use serde_json::json;

const TOKEN: &str = "test-token";

fn gateway(server: &MockServer) -> Result<HttpGateway> {
    let base = server.base_url();
    Ok(HttpGateway::new(&base, &base, TOKEN, Duration::from_secs(5))?)
}

#[tokio::test]
async fn list_devices_sends_bearer_and_parses_rows() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/devices")
                .header("Authorization", "Bearer test-token");
            then.status(200).json_body(json!([
                {"id": "d1", "name": "Sales", "organizationId": "org-1", "status": "connected"},
                {"id": "d2", "status": "rebooting"}
            ]));
        })
        .await;

    let devices = gateway(&server)?.list_devices().await?;

    mock.assert_async().await;
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].status, DeviceStatus::Connected);
    assert_eq!(devices[0].organization_id, Some(OrganizationId("org-1".into())));
    assert_eq!(devices[1].status, DeviceStatus::Unknown);
    Ok(())
}

#[tokio::test]
async fn create_device_posts_name_and_organization() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/devices")
                .json_body(json!({"name": "Support", "organizationId": "org-7"}));
            then.status(201)
                .json_body(json!({"id": "d9", "name": "Support", "status": "created"}));
        })
        .await;

    let created = gateway(&server)?
        .create_device("Support", &OrganizationId("org-7".into()))
        .await?;

    mock.assert_async().await;
    assert_eq!(created.id, DeviceId("d9".into()));
    assert_eq!(created.status, DeviceStatus::Created);
    Ok(())
}

#[tokio::test]
async fn device_status_escapes_the_device_id() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/devices/team%20a/status");
            then.status(200).json_body(json!({"status": "disconnected"}));
        })
        .await;

    let status = gateway(&server)?
        .device_status(&DeviceId("team a".into()))
        .await?;

    mock.assert_async().await;
    assert_eq!(status, DeviceStatus::Disconnected);
    Ok(())
}

#[tokio::test]
async fn request_pairing_returns_artifact() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/devices/d1/pair");
            then.status(200)
                .json_body(json!({"pairingArtifact": "data:image/png;base64,iVBORw0KGgo="}));
        })
        .await;

    let resp = gateway(&server)?
        .request_pairing(&DeviceId("d1".into()))
        .await?;

    mock.assert_async().await;
    assert_eq!(
        resp.pairing_artifact.as_deref(),
        Some("data:image/png;base64,iVBORw0KGgo=")
    );
    Ok(())
}

#[tokio::test]
async fn request_pairing_empty_body_means_already_active() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/devices/d1/pair");
            then.status(200);
        })
        .await;

    let resp = gateway(&server)?
        .request_pairing(&DeviceId("d1".into()))
        .await?;
    assert!(resp.pairing_artifact.is_none());
    Ok(())
}

#[tokio::test]
async fn send_text_addresses_the_device() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/messages/send").json_body(json!({
                "deviceId": "d1",
                "to": "5511987654321",
                "text": "hello"
            }));
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    let msg = TextMessage {
        to: "5511987654321".into(),
        text: "hello".into(),
    };
    gateway(&server)?
        .send_text(&DeviceId("d1".into()), &msg)
        .await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn send_media_posts_base64_payload() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/messages/sendMedia").json_body(json!({
                "deviceId": "d1",
                "to": "558533334444",
                "mimeType": "image/png",
                "dataBase64": "UE5H",
                "caption": "promo",
                "fileName": "promo.png"
            }));
            then.status(200);
        })
        .await;

    let msg = MediaMessage {
        to: "558533334444".into(),
        mime_type: "image/png".into(),
        data_base64: "UE5H".into(),
        caption: "promo".into(),
        file_name: "promo.png".into(),
    };
    gateway(&server)?
        .send_media(&DeviceId("d1".into()), &msg)
        .await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn error_status_maps_to_transport_with_short_body() -> Result<()> {
    let server = MockServer::start_async().await;
    let long_body = "x".repeat(500);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/devices");
            then.status(503).body(long_body.as_str());
        })
        .await;

    let err = gateway(&server)?.list_devices().await.unwrap_err();
    assert!(err.is_transient());
    let Error::Transport(msg) = err else {
        panic!("expected transport error");
    };
    assert!(msg.contains("503"));
    assert!(msg.matches('x').count() <= 200);
    Ok(())
}

#[tokio::test]
async fn notifications_use_store_base_url() -> Result<()> {
    let gateway_server = MockServer::start_async().await;
    let store_server = MockServer::start_async().await;
    let mock = store_server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/notifications")
                .header("Authorization", "Bearer test-token")
                .json_body(json!({
                    "name": "Bulk message",
                    "message": "hi",
                    "recipient": "5511987654321",
                    "channelId": "d1"
                }));
            then.status(201);
        })
        .await;

    let gw = HttpGateway::new(
        &gateway_server.base_url(),
        &format!("{}/api/", store_server.base_url()),
        TOKEN,
        Duration::from_secs(5),
    )?;
    gw.record(&NotificationRecord {
        name: "Bulk message".into(),
        message: "hi".into(),
        recipient: "5511987654321".into(),
        channel_id: "d1".into(),
    })
    .await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn history_listing_sends_page_limit_and_filters() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/notifications")
                .query_param("page", "2")
                .query_param("limit", "5")
                .query_param("recipient", "5511987654321");
            then.status(200).json_body(json!({
                "data": [{
                    "id": 42,
                    "name": "Bulk message",
                    "message": "hi",
                    "recipient": "5511987654321",
                    "channelId": "d1",
                    "createdAt": "2026-01-01T10:00:00Z"
                }],
                "pagination": {"total": 6, "pages": 2}
            }));
        })
        .await;

    let query = HistoryQuery::default()
        .page(2)
        .limit(5)
        .filter("recipient", "5511987654321")
        .filter("name", "  ");
    let page = gateway(&server)?.list(&query).await?;

    mock.assert_async().await;
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].channel_id.as_deref(), Some("d1"));
    assert_eq!(page.pagination.pages, 2);
    Ok(())
}

#[tokio::test]
async fn unreachable_gateway_is_transient() -> Result<()> {
    let gw = HttpGateway::new(
        "http://127.0.0.1:9",
        "http://127.0.0.1:9",
        TOKEN,
        Duration::from_millis(500),
    )?;
    let err = gw.device_status(&DeviceId("d1".into())).await.unwrap_err();
    assert!(err.is_transient());
    Ok(())
}
