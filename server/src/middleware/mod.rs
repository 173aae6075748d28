// Middleware modules for Control Plane API

pub mod auth;
pub mod cors;
pub mod mtls;
pub mod rate_limit;
pub mod tracing;
