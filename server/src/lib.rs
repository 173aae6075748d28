// Apple MDM Control Plane
// Wires the tenant/device/command stores (C1-C3), the check-in/Connect
// protocol handlers (C4), the APNs push fan-out (C5) and the SCEP
// certificate authority (C6) into one axum service.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::AppConfig;
use error::ApiError;
use mdm_core::types::TenantId;
use middleware::{
    auth::JwtValidator, cors::create_cors_layer, mtls::forwarded_client_cert_middleware,
    rate_limit::PerIpRateLimiter, tracing::otel_trace_middleware,
};
use mdm_push::client::ApnsClientPool;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: sqlx::SqlitePool,
    pub jwt_validator: Arc<JwtValidator>,
    pub rate_limiter: Arc<PerIpRateLimiter>,
    /// Per-tenant APNs push client pool (C5).
    pub apns_pool: ApnsClientPool,
    /// Per-tenant SCEP CA material cache (C6). Keyed by tenant ID, values
    /// are (cert_pem, key_pem) pairs.
    pub scep_ca_cache: mdm_core::pool::ResourcePool<TenantId, (String, String)>,
}

/// Build the application router: device-facing protocol endpoints behind
/// forwarded-mTLS-identity extraction and per-IP rate limiting, admin JSON
/// endpoints behind bearer-token auth, all sharing CORS/compression/tracing.
pub fn create_router(state: AppState) -> Router {
    let cors_layer = create_cors_layer(&state.config.cors);
    let jwt_validator = state.jwt_validator.clone();
    let rate_limiter = state.rate_limiter.clone();

    let device_routes: Router<AppState> = Router::new()
        .route("/mdm/checkin", post(routes::checkin::checkin_root))
        .route("/mdm/checkin/{tenant_id}", post(routes::checkin::checkin_tenant))
        .route("/mdm/connect", post(routes::connect::connect))
        .route(
            "/scep/{tenant_id}",
            get(routes::scep::scep_handler).post(routes::scep::scep_handler),
        )
        .route("/enroll/{tenant_id}/profile", get(routes::enroll::enrollment_profile))
        .layer(axum::middleware::from_fn(forwarded_client_cert_middleware))
        .layer(axum::middleware::from_fn_with_state(
            rate_limiter,
            middleware::rate_limit::per_ip_rate_limit_middleware,
        ));

    let admin_routes: Router<AppState> = Router::new()
        .route(
            "/api/tenants",
            get(routes::admin_tenants::list_tenants).post(routes::admin_tenants::create_tenant),
        )
        .route("/api/tenants/{id}", get(routes::admin_tenants::get_tenant))
        .route(
            "/api/tenants/{id}/devices",
            get(routes::admin_tenants::list_tenant_devices),
        )
        .route("/api/devices/{udid}/lock", post(routes::admin_devices::lock))
        .route("/api/devices/{udid}/wipe", post(routes::admin_devices::wipe))
        .route("/api/devices/{udid}/locate", post(routes::admin_devices::locate))
        .route("/api/devices/{udid}/lostmode", post(routes::admin_devices::lostmode))
        .route(
            "/api/devices/{udid}/disablelostmode",
            post(routes::admin_devices::disable_lostmode),
        )
        .route("/api/devices/{udid}/deviceinfo", post(routes::admin_devices::deviceinfo))
        .route("/api/devices/{udid}/commands", get(routes::admin_devices::command_history))
        .layer(axum::middleware::from_fn_with_state(
            jwt_validator,
            middleware::auth::jwt_auth_middleware,
        ));

    let middleware_stack = ServiceBuilder::new()
        .layer(cors_layer)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(otel_trace_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .merge(device_routes)
        .merge(admin_routes)
        .layer(middleware_stack)
        .fallback(not_found_handler)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    let response = types::HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

async fn not_found_handler() -> impl IntoResponse {
    ApiError::NotFound("endpoint not found".to_string()).into_response()
}

/// Periodically demotes commands stuck in `sent` back to `pending`
/// (`spec.md` §9's reconciliation-sweep mitigation — see
/// `db::commands::reconcile_stale_sent`), following the same
/// spawn-a-ticking-background-task shape used for key-rotation sweeps
/// elsewhere in this codebase's lineage. Runs until the process exits;
/// there is no explicit stop handle since it only ever reads/writes
/// already-durable rows and is safe to let the runtime drop at shutdown.
pub fn spawn_command_reconciliation_sweep(pool: sqlx::SqlitePool, config: config::CommandReconciliationConfig) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_secs));
        let stale_after = chrono::Duration::seconds(config.stale_sent_after_secs as i64);
        loop {
            ticker.tick().await;
            match db::commands::reconcile_stale_sent(&pool, stale_after).await {
                Ok(0) => {}
                Ok(n) => tracing::warn!(count = n, "reconciled stale sent commands back to pending"),
                Err(e) => tracing::error!(error = %e, "command reconciliation sweep failed"),
            }
        }
    });
}

/// Waits for SIGINT/SIGTERM, then gives in-flight requests up to
/// `grace_secs` to drain before axum's graceful shutdown completes
/// (`spec.md` §5 "wait up to 30s for in-flight requests, then exit").
pub async fn shutdown_signal(grace_secs: u64) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!(grace_secs, "shutdown signal received, draining in-flight requests");
    tokio::time::sleep(Duration::from_secs(grace_secs)).await;
}

/// Initialize OpenTelemetry tracing plus the `tracing` fmt layer.
pub fn init_telemetry(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&config.otel.endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(
            opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", config.otel.service_name.clone()),
                opentelemetry::KeyValue::new("service.version", config.otel.service_version.clone()),
                opentelemetry::KeyValue::new("deployment.environment", config.otel.environment.clone()),
            ]),
        ))
        .install_batch(opentelemetry_sdk::runtime::Tokio)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mdm_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("mdm-control-plane")))
        .init();

    Ok(())
}

/// In-memory `AppState` construction shared by this crate's own unit tests
/// and the black-box suite under `tests/integration_tests.rs`. Not
/// `#[cfg(test)]`-gated because external integration tests need it too.
pub mod test_support {
    use super::*;

    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.path = ":memory:".to_string();
        config
    }

    pub async fn test_state() -> AppState {
        let config = test_config();
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        AppState {
            jwt_validator: Arc::new(JwtValidator::new(config.jwt.clone()).unwrap()),
            rate_limiter: Arc::new(PerIpRateLimiter::new(config.rate_limit.clone())),
            apns_pool: ApnsClientPool::new(),
            scep_ca_cache: mdm_core::pool::ResourcePool::new(),
            config,
            db: pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_state;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_route_without_bearer_token_is_unauthorized() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/api/tenants").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
