// SCEP endpoint (C6, `spec.md` §4.5-§4.6)
//
// A single URL carries all three SCEP operations, selected by the
// `operation` query parameter exactly as Apple's enrollment client sends
// it: `GetCACert` and `GetCACaps` arrive as GET, `PKIOperation` as POST
// with the CMS message as the raw body.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use mdm_core::types::TenantId;
use serde::Deserialize;

use crate::db::audit::{self, AuditCategory, AuditOutcome, RecordAuditEvent};
use crate::db::tenants;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScepQuery {
    operation: String,
    /// Base64-encoded PKCS#7 message, used by GET PKIOperation requests
    /// (`spec.md` §6: "GET/POST SCEP PKCS#7 (base64 `message` param or
    /// binary body)"). POST requests carry the same bytes as the raw body
    /// instead.
    message: Option<String>,
}

pub async fn scep_handler(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ScepQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let tenant_id = TenantId::new(tenant_id)?;

    match query.operation.as_str() {
        "GetCACert" => get_ca_cert(&state, &tenant_id).await,
        "GetCACaps" => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            mdm_crypto::scep::get_ca_caps(),
        )
            .into_response()),
        "PKIOperation" => {
            use base64::Engine;
            let message = match query.message {
                Some(encoded) => base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| ApiError::BadRequest(format!("invalid base64 message param: {e}")))?,
                None => body.to_vec(),
            };
            pki_operation(&state, &tenant_id, &message).await
        }
        other => Err(ApiError::BadRequest(format!("unsupported SCEP operation: {other}"))),
    }
}

async fn get_ca_cert(state: &AppState, tenant_id: &TenantId) -> Result<Response, ApiError> {
    let (cert_pem, _) = ca_material(state, tenant_id).await?;
    let cert_der = mdm_crypto::ca::cert_der(&cert_pem)
        .map_err(|e| ApiError::Internal(format!("CA cert DER decode failed: {e}")))?;
    let response = mdm_crypto::scep::build_ca_cert_response(&cert_der)
        .map_err(|e| ApiError::Internal(format!("failed to build GetCACert response: {e}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-x509-ca-ra-cert")],
        response,
    )
        .into_response())
}

async fn pki_operation(state: &AppState, tenant_id: &TenantId, body: &[u8]) -> Result<Response, ApiError> {
    let tenant = tenants::get_by_id(&state.db, tenant_id).await?;
    let (cert_pem, key_pem) = ca_material(state, tenant_id).await?;

    // `handle_pki_operation` itself maps certificate-issuance failures to a
    // signed SCEP FAILURE CertRep (never an HTTP error). It can only return
    // `Err` when the request fails to parse far enough to build one — no
    // transactionID/nonce exists yet to sign a CertRep around. That case has
    // no SCEP-native representation, so it surfaces as a plain 400 (see
    // DESIGN.md Open Questions).
    match mdm_crypto::scep::handle_pki_operation(body, &cert_pem, &key_pem, &tenant.name) {
        Ok(cert_rep) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-pki-message")],
            cert_rep,
        )
            .into_response()),
        Err(e) => {
            tracing::warn!(error = %e, tenant = %tenant_id, "SCEP PKIOperation request could not be parsed");
            Err(ApiError::BadRequest(format!("malformed PKIOperation request: {e}")))
        }
    }
}

/// Returns the tenant's CA material, generating it on first use
/// (`spec.md` §4.5: "the CA keypair is generated lazily, on first SCEP
/// enrollment"). Cached in `AppState.scep_ca_cache` so a Connect-less
/// enrollment burst doesn't hit the database for every PKIOperation.
async fn ca_material(state: &AppState, tenant_id: &TenantId) -> Result<(String, String), ApiError> {
    let pair = state
        .scep_ca_cache
        .get_or_load(tenant_id.clone(), || async {
            ensure_ca(&state.db, tenant_id).await
        })
        .await?;
    Ok((*pair).clone())
}

pub(crate) async fn ensure_ca(pool: &sqlx::SqlitePool, tenant_id: &TenantId) -> Result<(String, String), ApiError> {
    let tenant = tenants::get_by_id(pool, tenant_id).await?;
    if tenant.has_ca() {
        return Ok((
            tenant.ca_cert_pem.expect("has_ca checked"),
            tenant.ca_key_pem.expect("has_ca checked"),
        ));
    }

    let material = mdm_crypto::ca::generate(&tenant.name)
        .map_err(|e| ApiError::Internal(format!("CA generation failed: {e}")))?;
    let row = tenants::set_ca_if_absent(pool, tenant_id, &material.cert_pem, &material.key_pem).await?;

    audit::record_audit_event(
        pool,
        RecordAuditEvent {
            tenant_id: Some(tenant_id.as_str()),
            device_id: None,
            category: AuditCategory::CaGenerated,
            outcome: AuditOutcome::Success,
            detail: None,
        },
    )
    .await?;

    Ok((
        row.ca_cert_pem.expect("set_ca_if_absent guarantees CA is set"),
        row.ca_key_pem.expect("set_ca_if_absent guarantees CA is set"),
    ))
}
