// Tenant resolution for the device-facing check-in/Connect endpoints
// (`spec.md` §4.4 "Tenant resolution for check-in"). Strategies are tried
// in order; the first one with a signal available wins.

use crate::db::tenants::{self, TenantRow};
use crate::error::ApiError;
use mdm_config::TenantResolutionMode;
use sqlx::SqlitePool;

pub struct ResolutionSignals<'a> {
    pub path_tenant_id: Option<&'a str>,
    pub apns_topic: Option<&'a str>,
    pub forwarded_cert_subject: Option<&'a str>,
}

pub async fn resolve_tenant(
    pool: &SqlitePool,
    mode: TenantResolutionMode,
    signals: ResolutionSignals<'_>,
) -> Result<TenantRow, ApiError> {
    if let Some(path_id) = signals.path_tenant_id {
        let id = mdm_core::types::TenantId::new(path_id)?;
        return Ok(tenants::get_by_id(pool, &id).await?);
    }

    if let Some(subject) = signals.forwarded_cert_subject {
        if let Some(domain) = common_name(subject) {
            if let Ok(tenant) = tenants::get_by_domain(pool, &domain).await {
                return Ok(tenant);
            }
        }
    }

    if let Some(topic) = signals.apns_topic {
        if let Ok(tenant) = tenants::get_by_apns_topic(pool, topic).await {
            return Ok(tenant);
        }
    }

    match mode {
        TenantResolutionMode::Strict => Err(ApiError::BadRequest(
            "could not resolve tenant from path, certificate or APNs topic".to_string(),
        )),
        TenantResolutionMode::Permissive => {
            let active = tenants::list_active(pool).await?;
            match active.as_slice() {
                [only] => Ok(only.clone()),
                [] => Err(ApiError::BadRequest("no active tenants configured".to_string())),
                _ => Err(ApiError::BadRequest(
                    "ambiguous tenant: more than one active tenant and no explicit signal".to_string(),
                )),
            }
        }
    }
}

/// Extract the `CN=` component of a distinguished-name-style subject
/// string, e.g. `"CN=acme.example.com,O=Acme Corp"` -> `"acme.example.com"`.
fn common_name(subject: &str) -> Option<String> {
    subject.split(',').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("CN=").map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_common_name_from_subject() {
        assert_eq!(
            common_name("CN=acme.example.com,O=Acme Corp"),
            Some("acme.example.com".to_string())
        );
        assert_eq!(common_name("O=Acme Corp"), None);
    }
}
