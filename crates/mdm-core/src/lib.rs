//! # mdm-core
//!
//! Shared domain types, the unified error taxonomy and the generic
//! [`pool::ResourcePool`] primitive used by the tenant registry, device
//! registry, command queue, APNs push pool and SCEP CA cache.
//!
//! ## Module structure
//!
//! - `types`: tenant/device/command identifiers and protocol enums
//! - `command_state`: the command lifecycle state machine
//! - `error`: unified error type
//! - `pool`: lazy, race-safe per-key resource cache

pub mod command_state;
pub mod error;
pub mod pool;
pub mod types;

pub use error::{Error, Result};
