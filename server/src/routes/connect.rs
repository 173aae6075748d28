// Connect endpoint (C4, `spec.md` §4.4 step 5-6)
//
// The enrollment profile points every device at a single, tenant-less
// `/mdm/connect` URL (`mdm_plist::profile::build_enrollment_profile`), so
// unlike check-in, Connect has no tenant context to resolve — the device
// is looked up by UDID alone (`db::devices::get_by_udid_any_tenant`) and
// its next due command by `db::commands::next_by_udid`.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use mdm_core::types::{CommandUuid, Udid};
use mdm_plist::connect::{self, CommandPayload, ReportedStatus};
use tracing::warn;

use crate::db::audit::{self, AuditCategory, AuditOutcome, RecordAuditEvent};
use crate::db::{commands, devices};
use crate::error::ApiError;
use crate::AppState;

pub async fn connect(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let report = connect::decode(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed Connect status report: {e}")))?;

    let udid = Udid::new(report.udid.clone())?;
    let device = match devices::get_by_udid_any_tenant(&state.db, &udid).await {
        Ok(device) => device,
        Err(_) => {
            // Apple retries Connect independently of check-in state; an
            // unknown UDID here means the device checked out or was
            // purged server-side. Nothing to deliver.
            warn!(udid = %report.udid, "Connect from unrecognized device");
            return Ok((StatusCode::OK, ()).into_response());
        }
    };
    let device_id = device.device_id()?;
    devices::update_last_seen(&state.db, &device_id).await?;

    if report.status() != ReportedStatus::Idle {
        if let Some(command_uuid) = report.command_uuid.as_deref() {
            apply_status_report(&state, &device_id, command_uuid, &report).await?;
        }
    }

    match commands::next_by_udid(&state.db, udid.as_str()).await? {
        Some(cmd) => {
            commands::mark_sent(&state.db, &cmd.command_uuid()?).await?;
            let params: BTreeMap<String, String> =
                serde_json::from_slice(&cmd.payload_plist).unwrap_or_default();
            let payload = CommandPayload {
                command_uuid: cmd.command_uuid,
                request_type: cmd.request_type,
                params,
            };
            let body = connect::encode_command(&payload)
                .map_err(|e| ApiError::Internal(format!("failed to encode command: {e}")))?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/xml; charset=UTF-8")],
                body,
            )
                .into_response())
        }
        None => Ok((StatusCode::OK, ()).into_response()),
    }
}

async fn apply_status_report(
    state: &AppState,
    device_id: &mdm_core::types::DeviceId,
    command_uuid_str: &str,
    report: &connect::StatusReport,
) -> Result<(), ApiError> {
    let command_uuid = match CommandUuid::parse(command_uuid_str) {
        Ok(uuid) => uuid,
        Err(e) => {
            warn!(command_uuid = %command_uuid_str, error = %e, "malformed CommandUUID in status report");
            return Ok(());
        }
    };

    match report.status() {
        ReportedStatus::Acknowledged => {
            commands::mark_acknowledged(&state.db, &command_uuid).await?;
            if let Some(query_responses) = &report.query_responses {
                devices::update_device_info(
                    &state.db,
                    device_id,
                    query_responses.get("SerialNumber").map(String::as_str),
                    query_responses.get("DeviceName").map(String::as_str),
                    query_responses.get("Model").map(String::as_str),
                    query_responses.get("OSVersion").map(String::as_str),
                )
                .await?;
            }
            audit::record_audit_event(
                &state.db,
                RecordAuditEvent {
                    tenant_id: None,
                    device_id: Some(&device_id.as_uuid().to_string()),
                    category: AuditCategory::CommandAcknowledged,
                    outcome: AuditOutcome::Success,
                    detail: Some(command_uuid_str),
                },
            )
            .await?;
        }
        ReportedStatus::Error | ReportedStatus::CommandFormatError => {
            let error_chain = report.error_chain.as_deref().unwrap_or("unspecified error");
            commands::mark_error(&state.db, &command_uuid, error_chain).await?;
            audit::record_audit_event(
                &state.db,
                RecordAuditEvent {
                    tenant_id: None,
                    device_id: Some(&device_id.as_uuid().to_string()),
                    category: AuditCategory::CommandErrored,
                    outcome: AuditOutcome::Failure,
                    detail: Some(error_chain),
                },
            )
            .await?;
        }
        ReportedStatus::NotNow => {
            commands::mark_notnow(&state.db, &command_uuid).await?;
        }
        ReportedStatus::Idle => unreachable!("Idle handled by caller"),
    }

    Ok(())
}
