// Enrollment profile generation (`spec.md` §3, §8 scenario 1)
//
// Generated on demand and never persisted. Requires the tenant to have
// both APNs credentials and a CA — the CA is generated lazily here if a
// tenant requests enrollment before its first SCEP round-trip.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use mdm_core::types::TenantId;
use mdm_plist::profile::{build_enrollment_profile, ProfileParams};

use crate::db::tenants;
use crate::error::ApiError;
use crate::AppState;

pub async fn enrollment_profile(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant_id = TenantId::new(tenant_id)?;
    let tenant = tenants::get_by_id(&state.db, &tenant_id).await?;

    let apns_topic = tenant.apns_topic.as_deref().ok_or_else(|| {
        ApiError::Conflict(format!("tenant {tenant_id} has no APNs topic configured yet"))
    })?;

    let (cert_pem, _) = state
        .scep_ca_cache
        .get_or_load(tenant_id.clone(), || async {
            crate::routes::scep::ensure_ca(&state.db, &tenant_id).await
        })
        .await?;
    let ca_cert_der = mdm_crypto::ca::cert_der(&cert_pem)
        .map_err(|e| ApiError::Internal(format!("CA cert DER decode failed: {e}")))?;

    let profile = build_enrollment_profile(&ProfileParams {
        tenant_id: tenant.id.as_str(),
        tenant_name: tenant.name.as_str(),
        server_url: &state.config.server.public_server_url,
        apns_topic,
        ca_cert_der: &ca_cert_der,
    })
    .map_err(|e| ApiError::Internal(format!("failed to build enrollment profile: {e}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-apple-aspen-config")],
        profile,
    )
        .into_response())
}
