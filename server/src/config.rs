//! Configuration for the MDM control plane server.
//!
//! The actual layered load order (env overrides, then `mdm.toml`, then
//! defaults) lives in the `mdm-config` crate so it can be unit-tested in
//! isolation; this module just re-exports it under the name the rest of
//! the binary expects.

pub use mdm_config::{
    AppConfig, CommandReconciliationConfig, ConfigError, CorsConfig, DatabaseConfig,
    FallbackCredentialsConfig, JwtConfig, OtelConfig, RateLimitConfig, ServerConfig,
    TenantResolutionMode,
};
