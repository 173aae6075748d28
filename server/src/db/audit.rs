// Audit trail (ambient concern — SPEC_FULL.md AMBIENT section; not a
// named module in spec.md, carried forward from the teacher's own audit
// log the way the teacher structures it)

use chrono::Utc;
use mdm_core::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

/// What kind of event this audit row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    TenantCreated,
    TenantApnsRotated,
    CaGenerated,
    DeviceEnrolled,
    DeviceCheckedOut,
    CommandEnqueued,
    CommandAcknowledged,
    CommandErrored,
    AccessDenied,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::TenantCreated => "tenant_created",
            AuditCategory::TenantApnsRotated => "tenant_apns_rotated",
            AuditCategory::CaGenerated => "ca_generated",
            AuditCategory::DeviceEnrolled => "device_enrolled",
            AuditCategory::DeviceCheckedOut => "device_checked_out",
            AuditCategory::CommandEnqueued => "command_enqueued",
            AuditCategory::CommandAcknowledged => "command_acknowledged",
            AuditCategory::CommandErrored => "command_errored",
            AuditCategory::AccessDenied => "access_denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub tenant_id: Option<String>,
    pub device_id: Option<String>,
    pub category: String,
    pub outcome: String,
    pub detail: Option<String>,
    pub created_at: String,
}

pub struct RecordAuditEvent<'a> {
    pub tenant_id: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub detail: Option<&'a str>,
}

/// Appends an audit row. Uses runtime-checked `sqlx::query` rather than
/// the compile-time `query!` macro, which needs a live database or an
/// offline query cache unavailable in this environment (see DESIGN.md).
pub async fn record_audit_event(pool: &SqlitePool, params: RecordAuditEvent<'_>) -> Result<AuditEvent> {
    let id = Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO audit_events (id, tenant_id, device_id, category, outcome, detail, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(params.tenant_id)
    .bind(params.device_id)
    .bind(params.category.as_str())
    .bind(params.outcome.as_str())
    .bind(params.detail)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(AuditEvent {
        id,
        tenant_id: params.tenant_id.map(str::to_string),
        device_id: params.device_id.map(str::to_string),
        category: params.category.as_str().to_string(),
        outcome: params.outcome.as_str().to_string(),
        detail: params.detail.map(str::to_string),
        created_at: now,
    })
}

pub async fn get_audit_events_by_device(pool: &SqlitePool, device_id: &str) -> Result<Vec<AuditEvent>> {
    Ok(sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events WHERE device_id = ? ORDER BY created_at DESC",
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_audit_events_by_tenant(pool: &SqlitePool, tenant_id: &str) -> Result<Vec<AuditEvent>> {
    Ok(sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events WHERE tenant_id = ? ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_audit_events_by_category(
    pool: &SqlitePool,
    category: AuditCategory,
) -> Result<Vec<AuditEvent>> {
    Ok(sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events WHERE category = ? ORDER BY created_at DESC",
    )
    .bind(category.as_str())
    .fetch_all(pool)
    .await?)
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
    async fn records_and_lists_by_tenant() {
        let pool = test_pool().await;
        record_audit_event(
            &pool,
            RecordAuditEvent {
                tenant_id: Some("acme"),
                device_id: None,
                category: AuditCategory::TenantCreated,
                outcome: AuditOutcome::Success,
                detail: None,
            },
        )
        .await
        .unwrap();

        let events = get_audit_events_by_tenant(&pool, "acme").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "tenant_created");
    }

    #[tokio::test]
    async fn filters_by_category() {
        let pool = test_pool().await;
        record_audit_event(
            &pool,
            RecordAuditEvent {
                tenant_id: Some("acme"),
                device_id: None,
                category: AuditCategory::AccessDenied,
                outcome: AuditOutcome::Failure,
                detail: Some("missing bearer token"),
            },
        )
        .await
        .unwrap();

        let events = get_audit_events_by_category(&pool, AuditCategory::AccessDenied).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "failure");
    }
}
