// Apple MDM Control Plane — binary entry point.
// The service itself (router, state, telemetry init) lives in `lib.rs` so
// it can be driven directly by `tests/integration_tests.rs`.

use std::future::IntoFuture;
use std::sync::Arc;

use mdm_server::config::AppConfig;
use mdm_server::middleware::{auth::JwtValidator, rate_limit::PerIpRateLimiter};
use mdm_server::{
    create_router, db, init_telemetry, shutdown_signal, spawn_command_reconciliation_sweep, AppState,
};
use mdm_push::client::ApnsClientPool;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().expect("failed to load configuration");

    init_telemetry(&config)?;

    let db_config = db::DatabaseConfig {
        path: config.database.path.clone(),
        max_connections: config.database.max_connections,
    };
    let db_pool = db::create_pool(&db_config).await?;
    db::run_migrations(&db_pool).await?;
    tracing::info!("database migrations completed");

    let jwt_validator = Arc::new(
        JwtValidator::new(config.jwt.clone()).expect("JWT validator initialization failed"),
    );
    let rate_limiter = Arc::new(PerIpRateLimiter::new(config.rate_limit.clone()));

    let app_state = AppState {
        config: config.clone(),
        db: db_pool,
        jwt_validator,
        rate_limiter,
        apns_pool: ApnsClientPool::new(),
        scep_ca_cache: mdm_core::pool::ResourcePool::new(),
    };

    spawn_command_reconciliation_sweep(app_state.db.clone(), config.command_reconciliation.clone());

    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.server.listen_address).await?;
    tracing::info!(address = %config.server.listen_address, "starting MDM control plane");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.server.shutdown_grace_secs))
    .into_future()
    .await?;

    Ok(())
}
