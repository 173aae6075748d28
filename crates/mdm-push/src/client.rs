//! APNs push client and per-tenant client pool
//!
//! One `reqwest::Client` per tenant, built from the tenant's APNs
//! certificate (used as TLS client auth) and cached in a
//! [`mdm_core::pool::ResourcePool`] — the same lazy, race-safe
//! double-checked-locking primitive the SCEP CA cache uses.

use std::sync::Arc;
use std::time::Duration;

use mdm_core::pool::ResourcePool;
use mdm_core::types::TenantId;
use reqwest::{Client, Identity};
use serde::Serialize;
use thiserror::Error;

/// APNs push request timeout (`spec.md` §5).
const APNS_TIMEOUT: Duration = Duration::from_secs(30);

const APNS_PRODUCTION_HOST: &str = "https://api.push.apple.com";
const APNS_DEVELOPMENT_HOST: &str = "https://api.development.push.apple.com";

#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to build APNs TLS client identity: {0}")]
    Identity(String),
    #[error("failed to build APNs HTTP client: {0}")]
    ClientBuild(String),
    #[error("APNs request failed: {0}")]
    Request(String),
    #[error("APNs rejected the push (status {status}): {reason}")]
    Rejected { status: u16, reason: String },
}

/// Tenant APNs credentials as persisted on the tenant row (`spec.md` §3).
#[derive(Clone)]
pub struct ApnsCredentials {
    /// PKCS#12 or PEM cert+key bundle bytes, as stored.
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
    pub topic: String,
    /// Use the production push host rather than development.
    pub production: bool,
}

/// Everything needed to address a single wake notification.
pub struct PushTarget {
    pub tenant_id: TenantId,
    pub push_token_hex: String,
    pub push_magic: String,
}

#[derive(Serialize)]
struct PushPayload {
    mdm: String,
}

struct TenantApnsClient {
    http: Client,
    topic: String,
    host: &'static str,
}

/// Lazily-constructed, tenant-scoped APNs push client pool.
///
/// Cache invalidated whenever `Tenant::update_apns` rotates credentials —
/// callers must invoke [`ApnsClientPool::invalidate`] after that update.
pub struct ApnsClientPool {
    pool: ResourcePool<TenantId, TenantApnsClient>,
}

impl ApnsClientPool {
    pub fn new() -> Self {
        Self {
            pool: ResourcePool::new(),
        }
    }

    /// Send a wake notification. Fire-and-forget from the caller's
    /// perspective: failures are returned, not retried.
    pub async fn push(
        &self,
        target: &PushTarget,
        credentials: ApnsCredentials,
    ) -> Result<(), PushError> {
        let tenant_id = target.tenant_id.clone();
        let client = self
            .pool
            .get_or_load(tenant_id, || async move { build_client(credentials) })
            .await?;

        let url = format!("{}/3/device/{}", client.host, target.push_token_hex);
        let payload = PushPayload {
            mdm: target.push_magic.clone(),
        };

        let response = client
            .http
            .post(&url)
            .header("apns-topic", &client.topic)
            .header("apns-push-type", "mdm")
            .header("apns-priority", "10")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PushError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let reason = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected { status, reason });
        }

        Ok(())
    }

    /// Invalidate the cached client for a tenant after its APNs credentials
    /// change.
    pub async fn invalidate(&self, tenant_id: &TenantId) {
        self.pool.invalidate(tenant_id).await;
    }
}

impl Default for ApnsClientPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ApnsClientPool {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

fn build_client(credentials: ApnsCredentials) -> Result<TenantApnsClient, PushError> {
    let identity = Identity::from_pem(
        &[credentials.cert_pem.as_slice(), credentials.key_pem.as_slice()].concat(),
    )
    .map_err(|e| PushError::Identity(e.to_string()))?;

    let http = Client::builder()
        .identity(identity)
        .http2_prior_knowledge()
        .timeout(APNS_TIMEOUT)
        .build()
        .map_err(|e| PushError::ClientBuild(e.to_string()))?;

    let host = if credentials.production {
        APNS_PRODUCTION_HOST
    } else {
        APNS_DEVELOPMENT_HOST
    };

    Ok(TenantApnsClient {
        http,
        topic: credentials.topic,
        host,
    })
}
