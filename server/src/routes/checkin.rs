// Check-in endpoint (C4, `spec.md` §4.4)
//
// POST /mdm/checkin or /mdm/checkin/{tenantID}. Apple's check-in protocol
// carries no response body on success, regardless of message type.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use mdm_core::types::{EnrollmentType, TenantId, Udid};
use mdm_plist::checkin::{self, CheckinMessage};
use tracing::{info, warn};

use crate::db::audit::{self, AuditCategory, AuditOutcome, RecordAuditEvent};
use crate::db::devices;
use crate::error::ApiError;
use crate::middleware::mtls::ForwardedClientCertSubject;
use crate::routes::tenant_resolution::{resolve_tenant, ResolutionSignals};
use crate::AppState;

pub async fn checkin_root(
    state: State<AppState>,
    cert_subject: Option<Extension<ForwardedClientCertSubject>>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    handle(state, None, cert_subject, body).await
}

pub async fn checkin_tenant(
    state: State<AppState>,
    Path(tenant_id): Path<String>,
    cert_subject: Option<Extension<ForwardedClientCertSubject>>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    handle(state, Some(tenant_id), cert_subject, body).await
}

async fn handle(
    State(state): State<AppState>,
    path_tenant_id: Option<String>,
    cert_subject: Option<Extension<ForwardedClientCertSubject>>,
    body: axum::body::Bytes,
) -> Result<StatusCode, ApiError> {
    let message = checkin::decode(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed check-in message: {e}")))?;

    let topic = match &message {
        CheckinMessage::Authenticate(m) => m.topic.as_deref(),
        CheckinMessage::TokenUpdate(m) => m.topic.as_deref(),
        CheckinMessage::CheckOut(_) => None,
    };

    let forwarded_cert_subject = cert_subject.as_ref().map(|Extension(s)| s.0.as_str());

    let tenant = resolve_tenant(
        &state.db,
        state.config.tenant_resolution,
        ResolutionSignals {
            path_tenant_id: path_tenant_id.as_deref(),
            apns_topic: topic,
            forwarded_cert_subject,
        },
    )
    .await?;
    let tenant_id = TenantId::new(tenant.id.clone())?;

    match message {
        CheckinMessage::Authenticate(msg) => {
            // spec.md §4.4: no persistent device row yet — the device is
            // not addressable until TokenUpdate provides a push token.
            info!(
                tenant = %tenant_id,
                udid = %msg.udid,
                serial = ?msg.serial_number,
                model = ?msg.model,
                "check-in Authenticate"
            );
        }
        CheckinMessage::TokenUpdate(msg) => {
            let udid = Udid::new(msg.udid.clone())?;
            let push_token_hex = hex::encode(&msg.token);
            devices::save_or_update_on_token_update(
                &state.db,
                &tenant_id,
                &udid,
                EnrollmentType::Manual,
                &push_token_hex,
                &msg.push_magic,
                None,
            )
            .await?;

            audit::record_audit_event(
                &state.db,
                RecordAuditEvent {
                    tenant_id: Some(tenant_id.as_str()),
                    device_id: None,
                    category: AuditCategory::DeviceEnrolled,
                    outcome: AuditOutcome::Success,
                    detail: Some(&msg.udid),
                },
            )
            .await?;
        }
        CheckinMessage::CheckOut(msg) => {
            let udid = Udid::new(msg.udid.clone())?;
            if let Err(e) = devices::remove(&state.db, &tenant_id, &udid).await {
                warn!(error = %e, udid = %msg.udid, "CheckOut for unknown device");
            } else {
                audit::record_audit_event(
                    &state.db,
                    RecordAuditEvent {
                        tenant_id: Some(tenant_id.as_str()),
                        device_id: None,
                        category: AuditCategory::DeviceCheckedOut,
                        outcome: AuditOutcome::Success,
                        detail: Some(&msg.udid),
                    },
                )
                .await?;
            }
        }
    }

    Ok(StatusCode::OK)
}
