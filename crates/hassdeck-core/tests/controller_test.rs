#![allow(clippy::unwrap_used)]
// End-to-end tests for `Controller` against a mocked hub.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hassdeck_core::{
    Command, CommandResult, ConnectionState, Controller, ControllerConfig, CoreError,
    CurtainPosition, Device, DeviceId, DeviceMapping, EntityId, Gesture, Outcome, RemoteKey,
};

const CURTAIN: DeviceId = DeviceId(3);
const FAN: DeviceId = DeviceId(7);
const REMOTE: DeviceId = DeviceId(12);
const UNMAPPED_REMOTE: DeviceId = DeviceId(13);

// ── Helpers ─────────────────────────────────────────────────────────

fn cover(position: u8) -> Value {
    json!({
        "entity_id": "cover.living_room",
        "state": if position > 0 { "open" } else { "closed" },
        "attributes": { "current_position": position },
        "last_changed": "2024-03-01T10:15:00+00:00",
        "last_updated": "2024-03-01T10:15:00+00:00"
    })
}

fn devices() -> Vec<Device> {
    vec![
        Device {
            position: Some(50),
            is_on: true,
            ..Device::new(CURTAIN, "curtain")
        },
        Device::new(FAN, "switch"),
        Device::new(REMOTE, "remote"),
        Device::new(UNMAPPED_REMOTE, "remote"),
    ]
}

fn mapping() -> DeviceMapping {
    [
        (CURTAIN, EntityId::from("cover.living_room")),
        (REMOTE, EntityId::from("remote.living_room_tv")),
    ]
    .into_iter()
    .collect()
}

async fn hub(initial_position: u8) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "API running." })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cover(initial_position)])))
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> ControllerConfig {
    let mut config = ControllerConfig::new(
        Url::parse(&server.uri()).unwrap(),
        SecretString::from("llat-test".to_string()),
    );
    config.refresh_interval = Duration::ZERO;
    config
}

async fn connected(server: &MockServer) -> Controller {
    let controller = Controller::new(config(server), devices(), mapping());
    controller.connect().await.unwrap();
    controller
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn connect_syncs_initial_states() {
    let server = hub(40).await;
    let controller = connected(&server).await;

    assert_eq!(*controller.connection_state().borrow(), ConnectionState::Connected);
    let curtain = controller.device(CURTAIN).unwrap();
    assert_eq!(curtain.position, Some(40));
    assert_eq!(curtain.ha_state.as_deref(), Some("open"));
    assert!(controller.store().last_refresh().is_some());

    controller.shutdown().await;
    assert_eq!(
        *controller.connection_state().borrow(),
        ConnectionState::Disconnected
    );
}

#[tokio::test]
async fn rejected_token_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let controller = Controller::new(config(&server), devices(), mapping());
    let err = controller.connect().await.unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(*controller.connection_state().borrow(), ConnectionState::Failed);
}

#[tokio::test]
async fn execute_requires_connection() {
    let server = hub(40).await;
    let controller = Controller::new(config(&server), devices(), mapping());
    let err = controller
        .execute(Command::SetPower { id: FAN, on: true })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ControllerDisconnected));
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn mapped_command_calls_service_and_merges_response() {
    let server = hub(40).await;
    Mock::given(method("POST"))
        .and(path("/api/services/cover/set_cover_position"))
        .and(body_json(json!({ "entity_id": "cover.living_room", "position": 80 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cover(80)])))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let result = controller
        .execute(Command::SetPosition {
            id: CURTAIN,
            position: 80,
        })
        .await
        .unwrap();

    assert_eq!(
        result,
        CommandResult::Sent {
            entity_id: EntityId::from("cover.living_room"),
            changed: 1
        }
    );
    assert_eq!(controller.device(CURTAIN).unwrap().position, Some(80));
    assert!(controller.activity()[0].message.contains("position 80%"));
    controller.shutdown().await;
}

#[tokio::test]
async fn unmapped_command_patches_the_store() {
    let server = hub(40).await;
    let controller = connected(&server).await;

    let result = controller
        .execute(Command::SetPower { id: FAN, on: true })
        .await
        .unwrap();

    assert_eq!(result, CommandResult::Local);
    assert!(controller.device(FAN).unwrap().is_on);
    controller.shutdown().await;
}

#[tokio::test]
async fn unknown_device_is_rejected() {
    let server = hub(40).await;
    let controller = connected(&server).await;
    let err = controller
        .execute(Command::SetPower {
            id: DeviceId(99),
            on: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DeviceNotFound { .. }));
    controller.shutdown().await;
}

// ── Remote & telemetry ──────────────────────────────────────────────

#[tokio::test]
async fn unmapped_remote_reports_failure_without_calling_hub() {
    let server = hub(40).await;
    Mock::given(method("POST"))
        .and(path("/api/services/remote/send_command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let mut telemetry = controller.subscribe_telemetry();

    let err = controller
        .send_remote(UNMAPPED_REMOTE, "power")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotMapped { .. }));

    let event = telemetry.recv().await.unwrap();
    assert!(!event.ok);
    assert_eq!(event.entity_id, None);
    assert_eq!(event.code, "power");
    controller.shutdown().await;
}

#[tokio::test]
async fn remote_send_reports_attempt_then_failure() {
    let server = hub(40).await;
    Mock::given(method("POST"))
        .and(path("/api/services/remote/send_command"))
        .and(body_json(json!({ "entity_id": "remote.living_room_tv", "command": "vol_up" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let mut telemetry = controller.subscribe_telemetry();

    assert!(controller.send_remote(REMOTE, "vol_up").await.is_err());

    let first = telemetry.recv().await.unwrap();
    assert!(first.ok);
    assert_eq!(
        first.entity_id,
        Some(EntityId::from("remote.living_room_tv"))
    );

    let second = telemetry.recv().await.unwrap();
    assert!(!second.ok);
    assert!(second.error.is_some());
    controller.shutdown().await;
}

#[tokio::test]
async fn remote_send_succeeds() {
    let server = hub(40).await;
    Mock::given(method("POST"))
        .and(path("/api/services/remote/send_command"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let mut telemetry = controller.subscribe_telemetry();

    controller.send_remote(REMOTE, "ok").await.unwrap();
    assert!(telemetry.recv().await.unwrap().ok);
    assert!(telemetry.try_recv().is_err());
    controller.shutdown().await;
}

// ── Controls ────────────────────────────────────────────────────────

#[tokio::test]
async fn control_commit_confirms_from_service_response() {
    let server = hub(50).await;
    Mock::given(method("POST"))
        .and(path("/api/services/cover/set_cover_position"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cover(80)])))
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let mut handle = controller.control::<CurtainPosition>(CURTAIN).unwrap();

    let outcome = handle.perform(Gesture::Commit(80)).await.unwrap();
    assert_eq!(outcome, Some(Outcome::Confirmed(80)));

    handle.close().await;
    controller.shutdown().await;
}

#[tokio::test]
async fn remote_panel_sends_accepted_presses() {
    let server = hub(40).await;
    Mock::given(method("POST"))
        .and(path("/api/services/remote/send_command"))
        .and(body_json(
            json!({ "entity_id": "remote.living_room_tv", "command": "vol_up" }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let controller = connected(&server).await;
    let mut telemetry = controller.subscribe_telemetry();
    let panel = controller.remote_input(REMOTE);

    let vol_up = panel.handlers_for(RemoteKey::VolUp);
    assert!(vol_up.on_key_down("Enter").prevent_default);
    // Inside the minimum interval: dropped.
    vol_up.on_key_down("Enter");

    let event = telemetry.recv().await.unwrap();
    assert_eq!(event.code, "vol_up");
    assert!(event.ok);

    controller.shutdown().await;
}
