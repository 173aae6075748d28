// Command queue (C3)
//
// Commands are queued per device and delivered one at a time through the
// Connect loop (`spec.md` §4.3). `mdm_core::command_state::CommandStatus`
// distinguishes `notnow` from `pending`, but both are equally eligible for
// (re)delivery on the device's next Connect — `next`/`next_by_udid` select
// `status IN ('pending', 'notnow')`, ordered oldest-first, so a `NotNow`
// reply simply re-queues the same command behind anything newer.

use chrono::Utc;
use mdm_core::command_state::{CommandEvent, CommandStateMachine, CommandStatus};
use mdm_core::types::{CommandUuid, DeviceId, RequestType};
use mdm_core::{Error, Result};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommandRow {
    pub id: String,
    pub command_uuid: String,
    pub device_id: String,
    pub request_type: String,
    pub payload_plist: Vec<u8>,
    pub status: String,
    pub error_chain: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CommandRow {
    pub fn command_uuid(&self) -> Result<CommandUuid> {
        CommandUuid::parse(&self.command_uuid)
    }

    pub fn status(&self) -> Result<CommandStatus> {
        CommandStatus::parse(&self.status)
    }

    pub fn request_type(&self) -> Result<RequestType> {
        parse_request_type(&self.request_type)
    }
}

pub fn parse_request_type(s: &str) -> Result<RequestType> {
    match s {
        "DeviceLock" => Ok(RequestType::DeviceLock),
        "EraseDevice" => Ok(RequestType::EraseDevice),
        "DeviceLocation" => Ok(RequestType::DeviceLocation),
        "DeviceInformation" => Ok(RequestType::DeviceInformation),
        "EnableLostMode" => Ok(RequestType::EnableLostMode),
        "DisableLostMode" => Ok(RequestType::DisableLostMode),
        other => Err(Error::BadRequest(format!("unknown request type: {other}"))),
    }
}

/// Enqueues a new command, always starting in `pending` (`spec.md` §4.3).
pub async fn enqueue(
    pool: &SqlitePool,
    device_id: &DeviceId,
    request_type: RequestType,
    payload_plist: &[u8],
) -> Result<CommandRow> {
    let now = Utc::now().to_rfc3339();
    let command_uuid = CommandUuid::new();
    let id = Uuid::now_v7().to_string();

    sqlx::query(
        "INSERT INTO commands
         (id, command_uuid, device_id, request_type, payload_plist, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
    )
    .bind(&id)
    .bind(command_uuid.to_string())
    .bind(device_id.as_uuid().to_string())
    .bind(request_type.as_str())
    .bind(payload_plist)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_by_id(pool, &id).await
}

async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<CommandRow> {
    sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("command {id} not found")))
}

pub async fn get_by_command_uuid(pool: &SqlitePool, command_uuid: &CommandUuid) -> Result<CommandRow> {
    sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE command_uuid = ?")
        .bind(command_uuid.to_string())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("command {command_uuid} not found")))
}

/// The next command due for delivery to `device_id`, oldest first. Used
/// by the Connect handler (`spec.md` §4.3): one command is sent per
/// Connect round-trip.
pub async fn next(pool: &SqlitePool, device_id: &DeviceId) -> Result<Option<CommandRow>> {
    Ok(sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM commands
         WHERE device_id = ? AND status IN ('pending', 'notnow')
         ORDER BY created_at ASC
         LIMIT 1",
    )
    .bind(device_id.as_uuid().to_string())
    .fetch_optional(pool)
    .await?)
}

/// Fallback for protocol paths that lack tenant context (`spec.md` §4.3):
/// finds the next due command for a device addressed by UDID alone.
pub async fn next_by_udid(pool: &SqlitePool, udid: &str) -> Result<Option<CommandRow>> {
    Ok(sqlx::query_as::<_, CommandRow>(
        "SELECT commands.* FROM commands
         JOIN devices ON commands.device_id = devices.id
         WHERE devices.udid = ? AND commands.status IN ('pending', 'notnow')
         ORDER BY commands.created_at ASC
         LIMIT 1",
    )
    .bind(udid)
    .fetch_optional(pool)
    .await?)
}

pub async fn pending_count(pool: &SqlitePool, device_id: &DeviceId) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM commands WHERE device_id = ? AND status IN ('pending', 'notnow')",
    )
    .bind(device_id.as_uuid().to_string())
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn apply_event(pool: &SqlitePool, command_uuid: &CommandUuid, event: CommandEvent) -> Result<()> {
    let row = match sqlx::query_as::<_, CommandRow>("SELECT * FROM commands WHERE command_uuid = ?")
        .bind(command_uuid.to_string())
        .fetch_optional(pool)
        .await?
    {
        Some(row) => row,
        None => {
            // A device may report status for a command the server no
            // longer tracks (e.g. after a purge) — log and ignore rather
            // than fail the whole Connect response (`spec.md` §4.3).
            warn!(%command_uuid, "status report for unknown command ignored");
            return Ok(());
        }
    };

    let current_status = row.status()?;
    let mut machine = CommandStateMachine::from_status(current_status);
    let next_status = machine.transition(event)?;
    let now = Utc::now().to_rfc3339();

    sqlx::query("UPDATE commands SET status = ?, updated_at = ? WHERE command_uuid = ?")
        .bind(next_status.as_str())
        .bind(&now)
        .bind(command_uuid.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_sent(pool: &SqlitePool, command_uuid: &CommandUuid) -> Result<()> {
    apply_event(pool, command_uuid, CommandEvent::Sent).await
}

pub async fn mark_acknowledged(pool: &SqlitePool, command_uuid: &CommandUuid) -> Result<()> {
    apply_event(pool, command_uuid, CommandEvent::Acknowledged).await
}

pub async fn mark_error(pool: &SqlitePool, command_uuid: &CommandUuid, error_chain: &str) -> Result<()> {
    apply_event(pool, command_uuid, CommandEvent::Error).await?;
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE commands SET error_chain = ?, updated_at = ? WHERE command_uuid = ?")
        .bind(error_chain)
        .bind(&now)
        .bind(command_uuid.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_notnow(pool: &SqlitePool, command_uuid: &CommandUuid) -> Result<()> {
    apply_event(pool, command_uuid, CommandEvent::NotNow).await
}

/// Demotes commands stuck in `sent` back to `pending` so the next Connect
/// redelivers them (`spec.md` §9's reconciliation-sweep mitigation for the
/// mark_sent-before-flush race: a Connect handler marks a command sent and
/// returns a `Response` value, but nothing observes whether that response
/// body actually reached the device before the connection dropped).
/// Bypasses `CommandStateMachine` deliberately — this is not a device- or
/// admin-reported event, just a timeout-based recovery of an ambiguous
/// `sent` row. Returns the number of commands reconciled.
pub async fn reconcile_stale_sent(pool: &SqlitePool, stale_after: chrono::Duration) -> Result<u64> {
    let threshold = (Utc::now() - stale_after).to_rfc3339();
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE commands SET status = 'pending', updated_at = ?
         WHERE status = 'sent' AND updated_at < ?",
    )
    .bind(&now)
    .bind(&threshold)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_by_device(pool: &SqlitePool, device_id: &DeviceId) -> Result<Vec<CommandRow>> {
    Ok(sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM commands WHERE device_id = ? ORDER BY created_at DESC",
    )
    .bind(device_id.as_uuid().to_string())
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{devices, run_migrations, tenants};
    use mdm_core::types::{EnrollmentType, TenantId, Udid};

    async fn seeded_device(pool: &SqlitePool) -> DeviceId {
        let tenant = TenantId::new("acme").unwrap();
        tenants::create(pool, &tenant, "Acme", "acme.example.com").await.unwrap();
        let udid = Udid::new("UDID-1").unwrap();
        let row = devices::save_or_update_on_token_update(
            pool,
            &tenant,
            &udid,
            EnrollmentType::Manual,
            "aa",
            "magic",
            None,
        )
        .await
        .unwrap();
        row.device_id().unwrap()
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn enqueue_and_deliver_one_at_a_time() {
        let pool = test_pool().await;
        let device_id = seeded_device(&pool).await;

        let first = enqueue(&pool, &device_id, RequestType::DeviceLock, b"<plist/>").await.unwrap();
        enqueue(&pool, &device_id, RequestType::DeviceLocation, b"<plist/>").await.unwrap();

        let next_cmd = next(&pool, &device_id).await.unwrap().unwrap();
        assert_eq!(next_cmd.id, first.id, "oldest command is delivered first");
    }

    #[tokio::test]
    async fn notnow_reply_makes_command_eligible_again() {
        let pool = test_pool().await;
        let device_id = seeded_device(&pool).await;
        let cmd = enqueue(&pool, &device_id, RequestType::DeviceLock, b"<plist/>").await.unwrap();
        let uuid = cmd.command_uuid().unwrap();

        mark_sent(&pool, &uuid).await.unwrap();
        mark_notnow(&pool, &uuid).await.unwrap();

        let redelivered = next(&pool, &device_id).await.unwrap().unwrap();
        assert_eq!(redelivered.command_uuid, cmd.command_uuid);
        assert_eq!(redelivered.status, "notnow");
    }

    #[tokio::test]
    async fn acknowledged_command_is_no_longer_eligible() {
        let pool = test_pool().await;
        let device_id = seeded_device(&pool).await;
        let cmd = enqueue(&pool, &device_id, RequestType::DeviceLock, b"<plist/>").await.unwrap();
        let uuid = cmd.command_uuid().unwrap();

        mark_sent(&pool, &uuid).await.unwrap();
        mark_acknowledged(&pool, &uuid).await.unwrap();

        assert!(next(&pool, &device_id).await.unwrap().is_none());
        assert_eq!(pending_count(&pool, &device_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_command_uuid_is_ignored_not_fatal() {
        let pool = test_pool().await;
        let bogus = CommandUuid::new();
        mark_acknowledged(&pool, &bogus).await.unwrap();
    }

    #[tokio::test]
    async fn reconcile_demotes_stale_sent_commands_back_to_pending() {
        let pool = test_pool().await;
        let device_id = seeded_device(&pool).await;
        let cmd = enqueue(&pool, &device_id, RequestType::DeviceLock, b"<plist/>").await.unwrap();
        let uuid = cmd.command_uuid().unwrap();
        mark_sent(&pool, &uuid).await.unwrap();

        // Not yet stale: a sweep with a long threshold leaves it alone.
        let reconciled = reconcile_stale_sent(&pool, chrono::Duration::hours(1)).await.unwrap();
        assert_eq!(reconciled, 0);
        assert_eq!(get_by_command_uuid(&pool, &uuid).await.unwrap().status, "sent");

        // A zero threshold treats any `sent` row as stale.
        let reconciled = reconcile_stale_sent(&pool, chrono::Duration::zero()).await.unwrap();
        assert_eq!(reconciled, 1);
        let redelivered = next(&pool, &device_id).await.unwrap().unwrap();
        assert_eq!(redelivered.command_uuid, cmd.command_uuid);
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let pool = test_pool().await;
        let device_id = seeded_device(&pool).await;
        let cmd = enqueue(&pool, &device_id, RequestType::DeviceLock, b"<plist/>").await.unwrap();
        let uuid = cmd.command_uuid().unwrap();

        let err = mark_acknowledged(&pool, &uuid).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
