// End-to-end tests driving the real axum router over its HTTP surface
// (`spec.md` §8): cold enrollment, SCEP certificate issuance, TokenUpdate
// push-credential registration, command fan-out with NotNow retry,
// CheckOut reversibility, and cross-tenant isolation.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use mdm_server::middleware::auth::JwtValidator;
use mdm_server::test_support::test_state;
use mdm_server::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> (Router, std::sync::Arc<JwtValidator>) {
    let state = test_state().await;
    let validator = state.jwt_validator.clone();
    (create_router(state), validator)
}

fn bearer(validator: &JwtValidator) -> String {
    format!("Bearer {}", validator.issue("admin@test").unwrap())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

fn authenticate_plist(udid: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>Authenticate</string>
    <key>UDID</key><string>{udid}</string>
    <key>SerialNumber</key><string>SN-{udid}</string>
    <key>Model</key><string>iPhone15,2</string>
</dict>
</plist>"#
    )
}

fn token_update_plist(udid: &str, push_magic: &str) -> String {
    // "AQIDBAUGBwg=" base64-decodes to 8 arbitrary token bytes.
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>TokenUpdate</string>
    <key>UDID</key><string>{udid}</string>
    <key>Token</key><data>AQIDBAUGBwg=</data>
    <key>PushMagic</key><string>{push_magic}</string>
</dict>
</plist>"#
    )
}

fn checkout_plist(udid: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>CheckOut</string>
    <key>UDID</key><string>{udid}</string>
</dict>
</plist>"#
    )
}

fn connect_status_plist(udid: &str, status: &str, command_uuid: Option<&str>) -> String {
    let command_line = command_uuid
        .map(|c| format!("<key>CommandUUID</key><string>{c}</string>"))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>UDID</key><string>{udid}</string>
    <key>Status</key><string>{status}</string>
    {command_line}
</dict>
</plist>"#
    )
}

async fn create_tenant(app: &Router, validator: &JwtValidator, id: &str) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tenants")
                .header("authorization", bearer(validator))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"id": id, "name": format!("{id} corp"), "domain": format!("{id}.example.com")})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK, "tenant creation must succeed");
}

/// Scenario 1 (`spec.md` §8): a fresh tenant's `GetCACert` response is
/// byte-identical across repeated requests — the CA is generated once,
/// lazily, and cached rather than regenerated per request.
#[tokio::test]
async fn cold_enroll_get_ca_cert_is_stable_across_requests() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/scep/acme?operation=GetCACert")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first_bytes = body_bytes(first).await;
    assert!(!first_bytes.is_empty());

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/scep/acme?operation=GetCACert")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second_bytes = body_bytes(second).await;

    assert_eq!(first_bytes, second_bytes, "CA must be generated once and reused");
}

/// `spec.md` §4.5: `GetCACaps` is a fixed capabilities list independent of
/// tenant state.
#[tokio::test]
async fn get_ca_caps_reports_capabilities() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/scep/acme?operation=GetCACaps")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(body.contains("POSTPKIOperation"));
}

/// Scenario 2/3 (`spec.md` §8): check-in `Authenticate` followed by
/// `TokenUpdate` registers the device and its push credentials, visible
/// through the admin device-list endpoint.
#[tokio::test]
async fn token_update_registers_push_credentials() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    let authenticate = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(authenticate_plist("UDID-001")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(authenticate.status(), StatusCode::OK);

    let token_update = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(token_update_plist("UDID-001", "magic-1")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(token_update.status(), StatusCode::OK);

    let devices = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tenants/acme/devices")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(devices.status(), StatusCode::OK);
    let list = body_json(devices).await;
    let device = &list.as_array().unwrap()[0];
    assert_eq!(device["udid"], "UDID-001");
    assert_eq!(device["push_magic"], "magic-1");
    assert_eq!(device["push_token"], "0102030405060708");
    assert_eq!(device["is_enrolled"], true);
}

/// Scenario 4 (`spec.md` §8): an admin-initiated command is delivered on
/// the next `Connect`, a `NotNow` report keeps it pending for redelivery,
/// and an `Acknowledged` report retires it.
#[tokio::test]
async fn command_fan_out_with_not_now_retry_then_acknowledged() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(token_update_plist("UDID-LOCK", "magic-lock")))
                .unwrap(),
        )
        .await
        .unwrap();

    let enqueue = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/devices/UDID-LOCK/lock")
                .header("authorization", bearer(&validator))
                .header("content-type", "application/json")
                .body(Body::from(json!({"PIN": "1234"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(enqueue.status(), StatusCode::OK);
    let enqueue_body = body_json(enqueue).await;
    let command_uuid = enqueue_body["command_uuid"].as_str().unwrap().to_string();

    // First Connect delivers the command.
    let delivery = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/connect")
                .body(Body::from(connect_status_plist("UDID-LOCK", "Idle", None)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delivery.status(), StatusCode::OK);
    let delivered = String::from_utf8(body_bytes(delivery).await).unwrap();
    assert!(delivered.contains(&command_uuid));
    assert!(delivered.contains("DeviceLock"));

    // Device reports NotNow: command must be redelivered, not dropped.
    let not_now = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/connect")
                .body(Body::from(connect_status_plist(
                    "UDID-LOCK",
                    "NotNow",
                    Some(&command_uuid),
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(not_now.status(), StatusCode::OK);

    let redelivery = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/connect")
                .body(Body::from(connect_status_plist("UDID-LOCK", "Idle", None)))
                .unwrap(),
        )
        .await
        .unwrap();
    let redelivered = String::from_utf8(body_bytes(redelivery).await).unwrap();
    assert!(redelivered.contains(&command_uuid), "NotNow command must be retried");

    // Device finally acknowledges: the command history shows it terminal.
    let ack = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/connect")
                .body(Body::from(connect_status_plist(
                    "UDID-LOCK",
                    "Acknowledged",
                    Some(&command_uuid),
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ack.status(), StatusCode::OK);

    let history = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/devices/UDID-LOCK/commands")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let entries = body_json(history).await;
    let entry = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["command_uuid"] == command_uuid)
        .unwrap();
    assert_eq!(entry["status"], "acknowledged");

    // No further Connect delivers this command again: it's terminal.
    let idle_again = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/connect")
                .body(Body::from(connect_status_plist("UDID-LOCK", "Idle", None)))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = String::from_utf8(body_bytes(idle_again).await).unwrap();
    assert!(!body.contains(&command_uuid));
}

/// Scenario 5 (`spec.md` §8): `CheckOut` removes the device row, and a
/// subsequent enrollment for the same UDID starts fresh rather than being
/// rejected as a duplicate.
#[tokio::test]
async fn checkout_is_reversible_then_device_can_re_enroll() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(token_update_plist("UDID-CO", "magic-a")))
                .unwrap(),
        )
        .await
        .unwrap();

    let checkout = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(checkout_plist("UDID-CO")))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(checkout.status(), StatusCode::OK);

    let devices_after_checkout = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/tenants/acme/devices")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list = body_json(devices_after_checkout).await;
    assert!(list.as_array().unwrap().is_empty(), "CheckOut must remove the device row");

    // Re-enrollment with a new push magic succeeds and is visible again.
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(token_update_plist("UDID-CO", "magic-b")))
                .unwrap(),
        )
        .await
        .unwrap();

    let devices_after_re_enroll = app
        .oneshot(
            Request::builder()
                .uri("/api/tenants/acme/devices")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let list = body_json(devices_after_re_enroll).await;
    let device = &list.as_array().unwrap()[0];
    assert_eq!(device["push_magic"], "magic-b");
}

/// Scenario 6 (`spec.md` §8): an admin action scoped to one tenant must
/// not reach a device enrolled under a different tenant.
#[tokio::test]
async fn tenant_isolation_on_admin_device_actions() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;
    create_tenant(&app, &validator, "globex").await;

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mdm/checkin/acme")
                .body(Body::from(token_update_plist("UDID-SHARED", "magic-acme")))
                .unwrap(),
        )
        .await
        .unwrap();

    // globex does not own UDID-SHARED; scoping the action to globex must 404.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/devices/UDID-SHARED/locate?tenant=globex")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // acme does own it, so the same action scoped correctly succeeds.
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/devices/UDID-SHARED/locate?tenant=acme")
                .header("authorization", bearer(&validator))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// `spec.md` §7: device protocol endpoints never require a bearer token,
/// unlike the admin API.
#[tokio::test]
async fn device_protocol_endpoints_require_no_bearer_token() {
    let (app, validator) = test_app().await;
    create_tenant(&app, &validator, "acme").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/scep/acme?operation=GetCACaps")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
