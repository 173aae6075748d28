// Admin tenant endpoints (`spec.md` §6 admin-facing HTTPS endpoints)

use axum::extract::{Path, State};
use axum::Json;
use mdm_core::types::TenantId;
use serde::{Deserialize, Serialize};

use crate::db::audit::{self, AuditCategory, AuditOutcome, RecordAuditEvent};
use crate::db::tenants::{self, TenantRow};
use crate::error::ApiError;
use crate::middleware::auth::RequireAuth;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub is_active: bool,
    pub has_ca: bool,
    pub has_apns_credentials: bool,
    pub apns_topic: Option<String>,
    pub apns_production: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TenantRow> for TenantResponse {
    fn from(row: TenantRow) -> Self {
        TenantResponse {
            has_ca: row.has_ca(),
            has_apns_credentials: row.has_apns_credentials(),
            apns_topic: row.apns_topic.clone(),
            id: row.id,
            name: row.name,
            domain: row.domain,
            is_active: row.is_active,
            apns_production: row.apns_production,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub id: String,
    pub name: String,
    pub domain: String,
}

pub async fn list_tenants(
    State(state): State<AppState>,
    _auth: RequireAuth,
) -> Result<Json<Vec<TenantResponse>>, ApiError> {
    let rows = tenants::list_active(&state.db).await?;
    Ok(Json(rows.into_iter().map(TenantResponse::from).collect()))
}

pub async fn create_tenant(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Json(req): Json<CreateTenantRequest>,
) -> Result<Json<TenantResponse>, ApiError> {
    let id = TenantId::new(req.id)?;
    let row = tenants::create(&state.db, &id, &req.name, &req.domain).await?;

    audit::record_audit_event(
        &state.db,
        RecordAuditEvent {
            tenant_id: Some(id.as_str()),
            device_id: None,
            category: AuditCategory::TenantCreated,
            outcome: AuditOutcome::Success,
            detail: Some(&req.domain),
        },
    )
    .await?;

    Ok(Json(row.into()))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<TenantResponse>, ApiError> {
    let id = TenantId::new(id)?;
    let row = tenants::get_by_id(&state.db, &id).await?;
    Ok(Json(row.into()))
}

/// `spec.md` §8 scenario 3: the device list must expose push credentials
/// and enrollment status, not just display facts, so admins (and tests)
/// can confirm a `TokenUpdate` was recorded correctly.
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub udid: String,
    pub enrollment_type: String,
    pub device_name: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub push_token: Option<String>,
    pub push_magic: Option<String>,
    pub is_enrolled: bool,
    pub is_lost_mode: bool,
    pub last_seen_at: Option<String>,
}

pub async fn list_tenant_devices(
    State(state): State<AppState>,
    _auth: RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeviceSummary>>, ApiError> {
    let id = TenantId::new(id)?;
    let rows = crate::db::devices::list_by_tenant(&state.db, &id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|d| DeviceSummary {
                udid: d.udid,
                enrollment_type: d.enrollment_type,
                device_name: d.device_name,
                model: d.model,
                os_version: d.os_version,
                push_token: d.push_token_hex,
                push_magic: d.push_magic,
                is_enrolled: d.is_enrolled,
                is_lost_mode: d.is_lost_mode,
                last_seen_at: d.last_seen_at,
            })
            .collect(),
    ))
}
