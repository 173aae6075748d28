// Device registry (C2)
//
// A device row is keyed by the server-assigned `DeviceId` but looked up
// in the hot path by `(tenant_id, udid)` — the pair Apple sends on every
// check-in and Connect message. `TokenUpdate` is the only message that
// creates or refreshes a device row (`spec.md` §4.2); `Authenticate` and
// `CheckOut` only touch enrollment state.

use chrono::Utc;
use mdm_core::types::{DeviceId, EnrollmentType, TenantId, Udid};
use mdm_core::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub id: String,
    pub tenant_id: String,
    pub udid: String,
    pub enrollment_type: String,
    pub push_token_hex: Option<String>,
    pub push_magic: Option<String>,
    pub unlock_token_b64: Option<String>,
    pub serial_number: Option<String>,
    pub device_name: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub is_enrolled: bool,
    pub is_lost_mode: bool,
    pub last_seen_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DeviceRow {
    pub fn device_id(&self) -> Result<DeviceId> {
        let uuid = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Internal(format!("corrupt device id in storage: {e}")))?;
        Ok(DeviceId::from_uuid(uuid))
    }

    pub fn enrollment_type(&self) -> Result<EnrollmentType> {
        parse_enrollment_type(&self.enrollment_type)
    }
}

pub fn parse_enrollment_type(s: &str) -> Result<EnrollmentType> {
    match s {
        "manual" => Ok(EnrollmentType::Manual),
        "dep" => Ok(EnrollmentType::Dep),
        "user" => Ok(EnrollmentType::User),
        other => Err(Error::Internal(format!("unknown enrollment type: {other}"))),
    }
}

/// `TokenUpdate` upsert (`spec.md` §4.2): creates the device row on first
/// contact, or refreshes push token/magic and device info on every
/// subsequent `TokenUpdate` for an already-enrolled device.
#[allow(clippy::too_many_arguments)]
pub async fn save_or_update_on_token_update(
    pool: &SqlitePool,
    tenant_id: &TenantId,
    udid: &Udid,
    enrollment_type: EnrollmentType,
    push_token_hex: &str,
    push_magic: &str,
    unlock_token_b64: Option<&str>,
) -> Result<DeviceRow> {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = find_any_state_by_udid(pool, tenant_id, udid).await? {
        sqlx::query(
            "UPDATE devices
             SET push_token_hex = ?, push_magic = ?, unlock_token_b64 = COALESCE(?, unlock_token_b64),
                 is_enrolled = 1, last_seen_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(push_token_hex)
        .bind(push_magic)
        .bind(unlock_token_b64)
        .bind(&now)
        .bind(&now)
        .bind(&existing.id)
        .execute(pool)
        .await?;
        return get_by_id(pool, &existing.id).await;
    }

    let id = DeviceId::new();
    let id_str = id.as_uuid().to_string();
    sqlx::query(
        "INSERT INTO devices
         (id, tenant_id, udid, enrollment_type, push_token_hex, push_magic, unlock_token_b64,
          is_enrolled, is_lost_mode, last_seen_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, ?)",
    )
    .bind(&id_str)
    .bind(tenant_id.as_str())
    .bind(udid.as_str())
    .bind(enrollment_type.to_string())
    .bind(push_token_hex)
    .bind(push_magic)
    .bind(unlock_token_b64)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_by_id(pool, &id_str).await
}

async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<DeviceRow> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("device {id} not found")))
}

/// Looks up a `(tenant_id, udid)` row regardless of `is_enrolled`. Used only
/// by the `TokenUpdate` upsert's tie-break, which must reuse a checked-out
/// row for re-enrollment rather than create a duplicate (`spec.md` §4.2:
/// "save_or_update reuses the row if one exists ... regardless of
/// is_enrolled").
async fn find_any_state_by_udid(
    pool: &SqlitePool,
    tenant_id: &TenantId,
    udid: &Udid,
) -> Result<Option<DeviceRow>> {
    Ok(
        sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE tenant_id = ? AND udid = ?")
            .bind(tenant_id.as_str())
            .bind(udid.as_str())
            .fetch_optional(pool)
            .await?,
    )
}

/// Admin-facing lookup. Filters `is_enrolled = 1`: a checked-out device is
/// not addressable (`spec.md` §8 invariant "a device is addressable by
/// admin iff is_enrolled"), so it must not resolve here even though its row
/// still exists for audit.
pub async fn get_by_udid(pool: &SqlitePool, tenant_id: &TenantId, udid: &Udid) -> Result<DeviceRow> {
    sqlx::query_as::<_, DeviceRow>(
        "SELECT * FROM devices WHERE tenant_id = ? AND udid = ? AND is_enrolled = 1",
    )
    .bind(tenant_id.as_str())
    .bind(udid.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound(format!("device {udid} not enrolled for tenant {tenant_id}")))
}

/// Looks up an enrolled device by UDID alone, ignoring tenant. Used by the
/// single-tenant-fallback check-in resolution strategy (`spec.md` §4.4
/// step 4), by Connect (which has no tenant context at all), and by admin
/// actions issued without `?tenant=`. Filters `is_enrolled = 1` for the same
/// addressability reason as `get_by_udid`: a checked-out device must not
/// resolve here either.
pub async fn get_by_udid_any_tenant(pool: &SqlitePool, udid: &Udid) -> Result<DeviceRow> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE udid = ? AND is_enrolled = 1 LIMIT 1")
        .bind(udid.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("device {udid} not found")))
}

pub async fn list_by_tenant(pool: &SqlitePool, tenant_id: &TenantId) -> Result<Vec<DeviceRow>> {
    Ok(sqlx::query_as::<_, DeviceRow>(
        "SELECT * FROM devices WHERE tenant_id = ? AND is_enrolled = 1 ORDER BY created_at",
    )
    .bind(tenant_id.as_str())
    .fetch_all(pool)
    .await?)
}

/// Applies a `DeviceInformation` query-response update (`spec.md` §4.3).
pub async fn update_device_info(
    pool: &SqlitePool,
    device_id: &DeviceId,
    serial_number: Option<&str>,
    device_name: Option<&str>,
    model: Option<&str>,
    os_version: Option<&str>,
) -> Result<DeviceRow> {
    let now = Utc::now().to_rfc3339();
    let id_str = device_id.as_uuid().to_string();
    sqlx::query(
        "UPDATE devices
         SET serial_number = COALESCE(?, serial_number),
             device_name = COALESCE(?, device_name),
             model = COALESCE(?, model),
             os_version = COALESCE(?, os_version),
             updated_at = ?
         WHERE id = ?",
    )
    .bind(serial_number)
    .bind(device_name)
    .bind(model)
    .bind(os_version)
    .bind(&now)
    .bind(&id_str)
    .execute(pool)
    .await?;
    get_by_id(pool, &id_str).await
}

pub async fn update_last_seen(pool: &SqlitePool, device_id: &DeviceId) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE devices SET last_seen_at = ?, updated_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&now)
        .bind(device_id.as_uuid().to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_lost_mode(pool: &SqlitePool, device_id: &DeviceId, enabled: bool) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE devices SET is_lost_mode = ?, updated_at = ? WHERE id = ?")
        .bind(enabled)
        .bind(&now)
        .bind(device_id.as_uuid().to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// `CheckOut` (`spec.md` §4.2): the device tells us it is unenrolling.
/// Marks the row un-enrolled rather than deleting it, preserving command
/// history for audit.
pub async fn remove(pool: &SqlitePool, tenant_id: &TenantId, udid: &Udid) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE devices SET is_enrolled = 0, updated_at = ? WHERE tenant_id = ? AND udid = ?",
    )
    .bind(&now)
    .bind(tenant_id.as_str())
    .bind(udid.as_str())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("device {udid} not enrolled for tenant {tenant_id}")));
    }
    Ok(())
}

/// Admin-initiated hard purge of a device row and its command history
/// (cascades via the `commands` foreign key).
pub async fn delete(pool: &SqlitePool, device_id: &DeviceId) -> Result<()> {
    let result = sqlx::query("DELETE FROM devices WHERE id = ?")
        .bind(device_id.as_uuid().to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("device {device_id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{run_migrations, tenants};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    async fn seeded_tenant(pool: &SqlitePool) -> TenantId {
        let id = TenantId::new("acme").unwrap();
        tenants::create(pool, &id, "Acme", "acme.example.com").await.unwrap();
        id
    }

    #[tokio::test]
    async fn token_update_creates_then_refreshes() {
        let pool = test_pool().await;
        let tenant = seeded_tenant(&pool).await;
        let udid = Udid::new("00008030-000000000000001E").unwrap();

        let created = save_or_update_on_token_update(
            &pool,
            &tenant,
            &udid,
            EnrollmentType::Manual,
            "aa",
            "magic-1",
            None,
        )
        .await
        .unwrap();
        assert_eq!(created.push_magic.as_deref(), Some("magic-1"));

        let refreshed = save_or_update_on_token_update(
            &pool,
            &tenant,
            &udid,
            EnrollmentType::Manual,
            "bb",
            "magic-2",
            None,
        )
        .await
        .unwrap();
        assert_eq!(refreshed.id, created.id, "same device row is reused");
        assert_eq!(refreshed.push_token_hex.as_deref(), Some("bb"));
    }

    #[tokio::test]
    async fn checkout_unenrolls_without_deleting() {
        let pool = test_pool().await;
        let tenant = seeded_tenant(&pool).await;
        let udid = Udid::new("UDID-1").unwrap();
        save_or_update_on_token_update(&pool, &tenant, &udid, EnrollmentType::Manual, "aa", "m", None)
            .await
            .unwrap();

        remove(&pool, &tenant, &udid).await.unwrap();
        assert!(get_by_udid(&pool, &tenant, &udid).await.is_err());
        assert!(list_by_tenant(&pool, &tenant).await.unwrap().is_empty());
    }
}
