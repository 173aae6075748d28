// Tenant registry (C1)
//
// A tenant owns its own SCEP CA keypair (generated lazily on first SCEP
// enrollment, `spec.md` §4.5) and its own APNs push credentials
// (`spec.md` §4.6). Both are write-once-then-replace: the CA keypair is
// set exactly once per tenant (a conditional `UPDATE ... WHERE
// ca_cert_pem IS NULL` avoids a races-to-generate-twice window, per
// `spec.md` §9), while APNs credentials may be rotated by an operator at
// any time via a full atomic replace.

use chrono::Utc;
use mdm_core::types::TenantId;
use mdm_core::{Error, Result};
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub is_active: bool,
    pub ca_cert_pem: Option<String>,
    pub ca_key_pem: Option<String>,
    pub apns_cert_pem: Option<String>,
    pub apns_key_pem: Option<String>,
    pub apns_topic: Option<String>,
    pub apns_production: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TenantRow {
    pub fn tenant_id(&self) -> Result<TenantId> {
        TenantId::new(self.id.clone())
    }

    pub fn has_ca(&self) -> bool {
        self.ca_cert_pem.is_some() && self.ca_key_pem.is_some()
    }

    pub fn has_apns_credentials(&self) -> bool {
        self.apns_cert_pem.is_some() && self.apns_key_pem.is_some() && self.apns_topic.is_some()
    }
}

pub async fn create(pool: &SqlitePool, id: &TenantId, name: &str, domain: &str) -> Result<TenantRow> {
    let now = Utc::now().to_rfc3339();
    let existing = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM tenants WHERE domain = ?")
        .bind(domain)
        .fetch_one(pool)
        .await?;
    if existing.0 > 0 {
        return Err(Error::Conflict(format!("domain {domain} already in use")));
    }

    sqlx::query(
        "INSERT INTO tenants (id, name, domain, is_active, apns_production, created_at, updated_at)
         VALUES (?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(id.as_str())
    .bind(name)
    .bind(domain)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_by_id(pool, id).await
}

pub async fn get_by_id(pool: &SqlitePool, id: &TenantId) -> Result<TenantRow> {
    sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant {id} not found")))
}

pub async fn get_by_domain(pool: &SqlitePool, domain: &str) -> Result<TenantRow> {
    sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE domain = ? AND is_active = 1")
        .bind(domain)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("tenant with domain {domain} not found")))
}

/// Used by the Connect/check-in APNs-topic tenant-resolution strategy
/// (`spec.md` §4.4 step 2): the topic is unique per tenant once APNs
/// credentials are provisioned.
pub async fn get_by_apns_topic(pool: &SqlitePool, topic: &str) -> Result<TenantRow> {
    sqlx::query_as::<_, TenantRow>(
        "SELECT * FROM tenants WHERE apns_topic = ? AND is_active = 1",
    )
    .bind(topic)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("tenant with apns topic {topic} not found")))
}

pub async fn list_active(pool: &SqlitePool) -> Result<Vec<TenantRow>> {
    Ok(
        sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE is_active = 1 ORDER BY created_at")
            .fetch_all(pool)
            .await?,
    )
}

pub async fn update_name(pool: &SqlitePool, id: &TenantId, name: &str) -> Result<TenantRow> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE tenants SET name = ?, updated_at = ? WHERE id = ? AND is_active = 1")
        .bind(name)
        .bind(&now)
        .bind(id.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tenant {id} not found")));
    }
    get_by_id(pool, id).await
}

/// Atomic full replace of APNs credentials (`spec.md` §4.6): the previous
/// cert/key/topic triple is replaced all at once so a handler never reads
/// a half-updated set. Callers must invalidate the APNs client pool entry
/// for this tenant afterward.
pub async fn update_apns(
    pool: &SqlitePool,
    id: &TenantId,
    cert_pem: &str,
    key_pem: &str,
    topic: &str,
    production: bool,
) -> Result<TenantRow> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE tenants
         SET apns_cert_pem = ?, apns_key_pem = ?, apns_topic = ?, apns_production = ?, updated_at = ?
         WHERE id = ? AND is_active = 1",
    )
    .bind(cert_pem)
    .bind(key_pem)
    .bind(topic)
    .bind(production)
    .bind(&now)
    .bind(id.as_str())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tenant {id} not found")));
    }
    get_by_id(pool, id).await
}

/// `spec.md` §4.1 `update_ca(id, cert_pem, key_pem)`: write-once — a second
/// call fails with `Conflict` rather than silently keeping the first value.
/// This is the admin-facing operation; the SCEP handler's lazy first-use CA
/// generation goes through `set_ca_if_absent` instead, whose refetch-on-race
/// semantics are deliberately more permissive than this one (`spec.md` §9).
pub async fn update_ca(pool: &SqlitePool, id: &TenantId, cert_pem: &str, key_pem: &str) -> Result<TenantRow> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE tenants SET ca_cert_pem = ?, ca_key_pem = ?, updated_at = ?
         WHERE id = ? AND ca_cert_pem IS NULL",
    )
    .bind(cert_pem)
    .bind(key_pem)
    .bind(&now)
    .bind(id.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let existing = get_by_id(pool, id).await?;
        if existing.has_ca() {
            return Err(Error::Conflict(format!("tenant {id} already has a CA installed")));
        }
        return Err(Error::NotFound(format!("tenant {id} not found")));
    }
    get_by_id(pool, id).await
}

/// Lazy first-use CA installation for the SCEP handler (`spec.md` §9
/// "Idempotency under concurrent first-use"). Unlike `update_ca`, a second
/// call never fails: the loser of a concurrent-first-use race silently
/// re-reads the winner's row and signs with that CA instead of its own
/// freshly generated (and now orphaned) one.
pub async fn set_ca_if_absent(
    pool: &SqlitePool,
    id: &TenantId,
    cert_pem: &str,
    key_pem: &str,
) -> Result<TenantRow> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "UPDATE tenants SET ca_cert_pem = ?, ca_key_pem = ?, updated_at = ?
         WHERE id = ? AND ca_cert_pem IS NULL",
    )
    .bind(cert_pem)
    .bind(key_pem)
    .bind(&now)
    .bind(id.as_str())
    .execute(pool)
    .await?;

    // rows_affected() == 0 means either the tenant doesn't exist or a
    // concurrent writer already installed a CA; get_by_id distinguishes
    // the two and returns the (possibly-different) winning CA either way.
    get_by_id(pool, id).await
}

pub async fn soft_delete(pool: &SqlitePool, id: &TenantId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE tenants SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(id.as_str())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("tenant {id} not found")));
    }
    Ok(())
}

pub async fn device_count(pool: &SqlitePool, id: &TenantId) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM devices WHERE tenant_id = ? AND is_enrolled = 1",
    )
    .bind(id.as_str())
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_and_fetch_roundtrip() {
        let pool = test_pool().await;
        let id = TenantId::new("acme").unwrap();
        let created = create(&pool, &id, "Acme Corp", "acme.example.com").await.unwrap();
        assert_eq!(created.name, "Acme Corp");
        assert!(!created.has_ca());

        let fetched = get_by_id(&pool, &id).await.unwrap();
        assert_eq!(fetched.domain, "acme.example.com");
    }

    #[tokio::test]
    async fn duplicate_domain_is_conflict() {
        let pool = test_pool().await;
        create(&pool, &TenantId::new("acme").unwrap(), "Acme", "acme.example.com")
            .await
            .unwrap();
        let err = create(&pool, &TenantId::new("acme2").unwrap(), "Acme 2", "acme.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn set_ca_if_absent_is_write_once_but_never_fails() {
        let pool = test_pool().await;
        let id = TenantId::new("acme").unwrap();
        create(&pool, &id, "Acme", "acme.example.com").await.unwrap();

        let first = set_ca_if_absent(&pool, &id, "cert-a", "key-a").await.unwrap();
        assert_eq!(first.ca_cert_pem.as_deref(), Some("cert-a"));

        let second = set_ca_if_absent(&pool, &id, "cert-b", "key-b").await.unwrap();
        assert_eq!(second.ca_cert_pem.as_deref(), Some("cert-a"), "first writer wins");
    }

    #[tokio::test]
    async fn update_ca_second_call_fails_with_conflict() {
        let pool = test_pool().await;
        let id = TenantId::new("acme").unwrap();
        create(&pool, &id, "Acme", "acme.example.com").await.unwrap();

        let first = update_ca(&pool, &id, "cert-a", "key-a").await.unwrap();
        assert_eq!(first.ca_cert_pem.as_deref(), Some("cert-a"));

        let err = update_ca(&pool, &id, "cert-b", "key-b").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let unchanged = get_by_id(&pool, &id).await.unwrap();
        assert_eq!(unchanged.ca_cert_pem.as_deref(), Some("cert-a"));
    }

    #[tokio::test]
    async fn soft_deleted_tenant_not_returned_by_domain_lookup() {
        let pool = test_pool().await;
        let id = TenantId::new("acme").unwrap();
        create(&pool, &id, "Acme", "acme.example.com").await.unwrap();
        soft_delete(&pool, &id).await.unwrap();
        assert!(get_by_domain(&pool, "acme.example.com").await.is_err());
    }
}
