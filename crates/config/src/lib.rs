//! MDM control plane configuration
//!
//! A TOML-based configuration system mirroring the teacher's layered
//! load order (environment variables, then a config file, then defaults),
//! adapted to the environment variables `spec.md` §6 names: listen
//! address, database path, public server URL, JWT secret, optional TLS
//! cert/key paths, and optional server-wide CA/APNs fallback material.
//!
//! # Configuration Sources (Priority Order)
//!
//! 1. **Environment Variables**: `MDM_*` prefixed variables override all
//! 2. **Config File**: `mdm.toml` in the current directory or `~/.config/mdm/`
//! 3. **Defaults**: sensible defaults for local development
//!
//! # Example mdm.toml
//!
//! ```toml
//! [server]
//! listen_address = "0.0.0.0:8443"
//! public_server_url = "https://mdm.example.test"
//!
//! [database]
//! path = "mdm.sqlite3"
//!
//! [jwt]
//! secret = "change-me"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// Server bind/listen configuration. The core never terminates device TLS
/// itself (`spec.md` §1 Non-goals) — `tls_cert_path`/`tls_key_path` are for
/// the optional case where no external reverse proxy is fronting it (e.g.
/// local development).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    /// Origin embedded as `ServerURL`/`CheckInURL` in generated enrollment
    /// profiles and SCEP URLs (`spec.md` §6).
    pub public_server_url: String,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    /// Seconds to wait for in-flight requests to drain on SIGINT/SIGTERM
    /// before exiting (`spec.md` §5).
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_address: "0.0.0.0:8443".to_string(),
            public_server_url: "https://localhost:8443".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            read_timeout_secs: 15,
            write_timeout_secs: 15,
            idle_timeout_secs: 60,
            shutdown_grace_secs: 30,
        }
    }
}

/// Database configuration (`spec.md` §6 "Persistence layout").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "mdm.sqlite3".to_string(),
            max_connections: 10,
        }
    }
}

/// Admin bearer-token configuration. `spec.md` §1 Non-goals: the core
/// "does not validate admin identity beyond a bearer-token hook" — the
/// secret here signs/verifies that token, it is not a full identity
/// provider integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub ttl_seconds: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtConfig {
            secret: "development-only-secret-change-me".to_string(),
            issuer: "mdm-control-plane".to_string(),
            ttl_seconds: 3600,
        }
    }
}

/// CORS configuration for the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: vec!["https://localhost:3000".to_string()],
            allow_credentials: true,
            max_age_seconds: 3600,
        }
    }
}

/// Per-IP rate limiting applied to device-facing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_second: 50,
            burst_size: 100,
        }
    }
}

/// OpenTelemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelConfig {
    pub endpoint: String,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        OtelConfig {
            endpoint: "http://localhost:4317".to_string(),
            service_name: "mdm-control-plane".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Server-wide fallback APNs/CA material, used only before a tenant has its
/// own credentials (`spec.md` §6 "optional server-wide CA/APNs material").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackCredentialsConfig {
    pub apns_cert_path: Option<PathBuf>,
    pub apns_key_path: Option<PathBuf>,
    pub apns_topic: Option<String>,
}

impl Default for FallbackCredentialsConfig {
    fn default() -> Self {
        FallbackCredentialsConfig {
            apns_cert_path: None,
            apns_key_path: None,
            apns_topic: None,
        }
    }
}

/// Background sweep that recovers commands stuck in `sent` (`spec.md` §9:
/// "an implementation should either mark_sent only after successful
/// response flush, or provide a reconciliation sweep" — the Connect
/// handler cannot observe flush success from inside an axum handler, so
/// this repo takes the sweep).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandReconciliationConfig {
    /// How often the sweep runs.
    pub interval_secs: u64,
    /// A command still `sent` this long after its last status change is
    /// assumed lost in transit and demoted back to `pending`.
    pub stale_sent_after_secs: u64,
}

impl Default for CommandReconciliationConfig {
    fn default() -> Self {
        CommandReconciliationConfig {
            interval_secs: 60,
            stale_sent_after_secs: 300,
        }
    }
}

/// Tenant-resolution strictness for check-in (`spec.md` §9 open question:
/// "first active tenant" fallback must be configurable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantResolutionMode {
    /// Reject with 400 if no explicit signal (path/topic/cert) resolves a
    /// tenant. Recommended for multi-tenant production deployments.
    Strict,
    /// Fall back to the single active tenant when exactly one exists.
    /// Convenient for development, insecure once a second tenant exists.
    Permissive,
}

impl Default for TenantResolutionMode {
    fn default() -> Self {
        TenantResolutionMode::Permissive
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub otel: OtelConfig,
    pub fallback_credentials: FallbackCredentialsConfig,
    pub tenant_resolution: TenantResolutionMode,
    pub command_reconciliation: CommandReconciliationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            otel: OtelConfig::default(),
            fallback_credentials: FallbackCredentialsConfig::default(),
            tenant_resolution: TenantResolutionMode::default(),
            command_reconciliation: CommandReconciliationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration with the following priority:
    /// 1. Environment variables (`MDM_*`)
    /// 2. Config file (if present in a standard location)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => AppConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("mdm.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".config").join("mdm").join("mdm.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }
        None
    }

    /// Environment variables named directly by `spec.md` §6, checked after
    /// any config file so they always win.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MDM_LISTEN_ADDRESS") {
            self.server.listen_address = v;
        }
        if let Ok(v) = std::env::var("MDM_PUBLIC_SERVER_URL") {
            self.server.public_server_url = v;
        }
        if let Ok(v) = std::env::var("MDM_DATABASE_PATH") {
            self.database.path = v;
        }
        if let Ok(v) = std::env::var("MDM_JWT_SECRET") {
            self.jwt.secret = v;
        }
        if let Ok(v) = std::env::var("MDM_TLS_CERT_PATH") {
            self.server.tls_cert_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MDM_TLS_KEY_PATH") {
            self.server.tls_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MDM_FALLBACK_APNS_CERT_PATH") {
            self.fallback_credentials.apns_cert_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MDM_FALLBACK_APNS_KEY_PATH") {
            self.fallback_credentials.apns_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("MDM_FALLBACK_APNS_TOPIC") {
            self.fallback_credentials.apns_topic = Some(v);
        }
        if let Ok(v) = std::env::var("MDM_TENANT_RESOLUTION") {
            self.tenant_resolution = match v.as_str() {
                "strict" => TenantResolutionMode::Strict,
                _ => TenantResolutionMode::Permissive,
            };
        }
        if let Ok(v) = std::env::var("MDM_OTEL_ENDPOINT") {
            self.otel.endpoint = v;
        }
        if let Ok(v) = std::env::var("MDM_COMMAND_RECONCILE_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.command_reconciliation.interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("MDM_COMMAND_STALE_SENT_SECS") {
            if let Ok(secs) = v.parse() {
                self.command_reconciliation.stale_sent_after_secs = secs;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "jwt.secret must not be empty".to_string(),
            ));
        }
        if self.database.path.is_empty() {
            return Err(ConfigError::ValidationError(
                "database.path must not be empty".to_string(),
            ));
        }
        if self.server.tls_cert_path.is_some() != self.server.tls_key_path.is_some() {
            return Err(ConfigError::ValidationError(
                "tls_cert_path and tls_key_path must both be set or both omitted".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("failed to serialize config: {e}")))?;
        fs::write(path, toml_string).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_address, "0.0.0.0:8443");
        assert_eq!(config.server.read_timeout_secs, 15);
        assert_eq!(config.server.shutdown_grace_secs, 30);
        assert_eq!(config.tenant_resolution, TenantResolutionMode::Permissive);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let toml_content = r#"
[server]
listen_address = "127.0.0.1:9443"
public_server_url = "https://mdm.example.test"

[database]
path = "/var/lib/mdm/mdm.sqlite3"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_address, "127.0.0.1:9443");
        assert_eq!(config.database.path, "/var/lib/mdm/mdm.sqlite3");
    }

    #[test]
    fn empty_jwt_secret_fails_validation() {
        let mut config = AppConfig::default();
        config.jwt.secret = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn mismatched_tls_paths_fail_validation() {
        let mut config = AppConfig::default();
        config.server.tls_cert_path = Some(PathBuf::from("/tmp/cert.pem"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let config = AppConfig::default();
        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_address, loaded.server.listen_address);
        assert_eq!(config.database.path, loaded.database.path);
    }
}
