// Admin device command endpoints (`spec.md` §6 admin-facing HTTPS
// endpoints). Every action enqueues a command (C3) then fires an
// asynchronous APNs wake push (C5) best-effort — push failure does not
// roll back the enqueue (`spec.md` §7 "Dependency failure").

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use mdm_core::types::{DeviceId, RequestType, TenantId, Udid};
use mdm_push::client::{ApnsCredentials, PushTarget};
use serde::{Deserialize, Serialize};

use crate::db::audit::{self, AuditCategory, AuditOutcome, RecordAuditEvent};
use crate::db::{commands, devices};
use crate::db::tenants;
use crate::error::ApiError;
use crate::middleware::auth::RequireAuth;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CommandEnqueuedResponse {
    pub command_uuid: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LockRequest {
    #[serde(rename = "PIN")]
    pub pin: Option<String>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LostModeRequest {
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: Option<String>,
    #[serde(rename = "Footnote")]
    pub footnote: Option<String>,
}

/// Optional tenant scoping for the tenant-less `/api/devices/{udid}/...`
/// paths (`spec.md` §6). Device-facing protocol endpoints resolve a device
/// across all tenants by UDID alone (`devices::get_by_udid_any_tenant`),
/// but admin actions are expected to respect tenant isolation (`spec.md`
/// §8 scenario 6) whenever the admin caller knows which tenant it is
/// operating as; `?tenant=` carries that context since the path itself
/// does not.
#[derive(Debug, Deserialize, Default)]
pub struct TenantScope {
    pub tenant: Option<String>,
}

pub async fn lock(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
    body: Option<Json<LockRequest>>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mut params = BTreeMap::new();
    if let Some(pin) = req.pin {
        params.insert("PIN".to_string(), pin);
    }
    if let Some(message) = req.message {
        params.insert("Message".to_string(), message);
    }
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::DeviceLock, params).await
}

pub async fn wipe(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::EraseDevice, BTreeMap::new()).await
}

pub async fn locate(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::DeviceLocation, BTreeMap::new()).await
}

pub async fn lostmode(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
    body: Option<Json<LostModeRequest>>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mut params = BTreeMap::new();
    if let Some(message) = req.message {
        params.insert("Message".to_string(), message);
    }
    if let Some(phone_number) = req.phone_number {
        params.insert("PhoneNumber".to_string(), phone_number);
    }
    if let Some(footnote) = req.footnote {
        params.insert("Footnote".to_string(), footnote);
    }

    let device_id = resolve_device_id(&state, scope.tenant.as_deref(), &udid).await?;
    devices::set_lost_mode(&state.db, &device_id, true).await?;
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::EnableLostMode, params).await
}

pub async fn disable_lostmode(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    let device_id = resolve_device_id(&state, scope.tenant.as_deref(), &udid).await?;
    devices::set_lost_mode(&state.db, &device_id, false).await?;
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::DisableLostMode, BTreeMap::new()).await
}

/// `DeviceInformation` with a fixed query list (`spec.md` §6): the set of
/// queries every admin-initiated device-info refresh asks for.
const DEVICE_INFO_QUERIES: &[&str] = &["SerialNumber", "DeviceName", "Model", "OSVersion"];

pub async fn deviceinfo(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    let mut params = BTreeMap::new();
    params.insert(
        "Queries".to_string(),
        DEVICE_INFO_QUERIES.join(","),
    );
    enqueue_and_push(&state, scope.tenant.as_deref(), &udid, RequestType::DeviceInformation, params).await
}

#[derive(Debug, Serialize)]
pub struct CommandHistoryEntry {
    pub command_uuid: String,
    pub request_type: String,
    pub status: String,
    pub error_chain: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Recent command history, most recent first, capped at 50 (`spec.md` §6).
pub async fn command_history(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(udid): Path<String>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<Vec<CommandHistoryEntry>>, ApiError> {
    let device_id = resolve_device_id(&state, scope.tenant.as_deref(), &udid).await?;
    let rows = commands::list_by_device(&state.db, &device_id).await?;
    Ok(Json(
        rows.into_iter()
            .take(50)
            .map(|c| CommandHistoryEntry {
                command_uuid: c.command_uuid,
                request_type: c.request_type,
                status: c.status,
                error_chain: c.error_chain,
                created_at: c.created_at,
                updated_at: c.updated_at,
            })
            .collect(),
    ))
}

/// Resolve a device row for an admin action. When `tenant_scope` is given
/// (via `?tenant=`), the lookup is scoped to that tenant, so a UDID
/// belonging to a different tenant resolves to a 404 — enforcing tenant
/// isolation on the otherwise tenant-less `/api/devices/{udid}/...` paths
/// (`spec.md` §8 scenario 6). Without it, lookup falls back to matching
/// the UDID across all tenants.
async fn resolve_device(
    state: &AppState,
    tenant_scope: Option<&str>,
    udid: &str,
) -> Result<crate::db::devices::DeviceRow, ApiError> {
    let udid_typed = Udid::new(udid.to_string())?;
    match tenant_scope {
        Some(tenant) => {
            let tenant_id = TenantId::new(tenant.to_string())?;
            Ok(devices::get_by_udid(&state.db, &tenant_id, &udid_typed).await?)
        }
        None => Ok(devices::get_by_udid_any_tenant(&state.db, &udid_typed).await?),
    }
}

async fn resolve_device_id(
    state: &AppState,
    tenant_scope: Option<&str>,
    udid: &str,
) -> Result<DeviceId, ApiError> {
    let device = resolve_device(state, tenant_scope, udid).await?;
    Ok(device.device_id()?)
}

async fn enqueue_and_push(
    state: &AppState,
    tenant_scope: Option<&str>,
    udid: &str,
    request_type: RequestType,
    params: BTreeMap<String, String>,
) -> Result<Json<CommandEnqueuedResponse>, ApiError> {
    let device = resolve_device(state, tenant_scope, udid).await?;
    let device_id = device.device_id()?;

    let push_token_hex = device
        .push_token_hex
        .clone()
        .ok_or_else(|| ApiError::Conflict(format!("device {udid} has not completed TokenUpdate")))?;
    let push_magic = device
        .push_magic
        .clone()
        .ok_or_else(|| ApiError::Conflict(format!("device {udid} has not completed TokenUpdate")))?;

    let payload_plist = serde_json::to_vec(&params)
        .map_err(|e| ApiError::Internal(format!("failed to encode command params: {e}")))?;
    let cmd = commands::enqueue(&state.db, &device_id, request_type, &payload_plist).await?;

    audit::record_audit_event(
        &state.db,
        RecordAuditEvent {
            tenant_id: Some(&device.tenant_id),
            device_id: Some(&device_id.as_uuid().to_string()),
            category: AuditCategory::CommandEnqueued,
            outcome: AuditOutcome::Success,
            detail: Some(request_type.as_str()),
        },
    )
    .await?;

    let tenant_id = TenantId::new(device.tenant_id.clone())?;
    let tenant = tenants::get_by_id(&state.db, &tenant_id).await?;

    if !tenant.has_apns_credentials() {
        tracing::warn!(tenant = %tenant_id, "command enqueued but tenant has no APNs credentials; device must re-poll naturally");
        return Ok(Json(CommandEnqueuedResponse {
            command_uuid: cmd.command_uuid,
        }));
    }

    let credentials = ApnsCredentials {
        cert_pem: tenant.apns_cert_pem.expect("checked by has_apns_credentials").into_bytes(),
        key_pem: tenant.apns_key_pem.expect("checked by has_apns_credentials").into_bytes(),
        topic: tenant.apns_topic.expect("checked by has_apns_credentials"),
        production: tenant.apns_production,
    };
    let target = PushTarget {
        tenant_id,
        push_token_hex,
        push_magic,
    };

    if let Err(e) = state.apns_pool.push(&target, credentials).await {
        tracing::error!(error = %e, udid = %udid, "APNs push failed after command enqueue");
        return Err(ApiError::Dependency(format!("APNs push failed: {e}")));
    }

    Ok(Json(CommandEnqueuedResponse {
        command_uuid: cmd.command_uuid,
    }))
}
