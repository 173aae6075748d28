//! Core domain type definitions shared by the tenant registry, device
//! registry and command queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Tenant identifier. Tenants are created by an operator and addressed by a
/// short opaque slug (e.g. `"acme"`), not a UUID — the enrollment profile
/// and SCEP URLs embed it directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 64 {
            return Err(Error::BadRequest(
                "tenant id must be 1-64 characters".to_string(),
            ));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::BadRequest(
                "tenant id must be alphanumeric, '-' or '_'".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vendor-assigned device identifier, unique within a tenant. Apple sends
/// this as `UDID` in every check-in and Connect message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Udid(String);

impl Udid {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > 128 {
            return Err(Error::BadRequest("UDID must be 1-128 characters".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Udid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned internal device identifier (UUIDv7, sortable by creation
/// time). Distinct from the vendor-assigned [`Udid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier that appears on the wire for a queued command. The device
/// echoes this value back verbatim in its status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandUuid(Uuid);

impl CommandUuid {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::BadRequest(format!("invalid command uuid: {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CommandUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Apple clients expect uppercase UUID strings in command payloads.
        write!(f, "{}", self.0.to_string().to_uppercase())
    }
}

/// How a device came to be enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentType {
    Manual,
    Dep,
    User,
}

impl fmt::Display for EnrollmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnrollmentType::Manual => "manual",
            EnrollmentType::Dep => "dep",
            EnrollmentType::User => "user",
        };
        write!(f, "{s}")
    }
}

/// The MDM `RequestType` of a queued command, as it appears in the
/// Connect response payload and in admin command history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    DeviceLock,
    EraseDevice,
    DeviceLocation,
    DeviceInformation,
    EnableLostMode,
    DisableLostMode,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::DeviceLock => "DeviceLock",
            RequestType::EraseDevice => "EraseDevice",
            RequestType::DeviceLocation => "DeviceLocation",
            RequestType::DeviceInformation => "DeviceInformation",
            RequestType::EnableLostMode => "EnableLostMode",
            RequestType::DisableLostMode => "DisableLostMode",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `Status` field of a Connect status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectStatus {
    Idle,
    Acknowledged,
    Error,
    NotNow,
    CommandFormatError,
}

impl ConnectStatus {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Idle" => Ok(ConnectStatus::Idle),
            "Acknowledged" => Ok(ConnectStatus::Acknowledged),
            "Error" => Ok(ConnectStatus::Error),
            "NotNow" => Ok(ConnectStatus::NotNow),
            "CommandFormatError" => Ok(ConnectStatus::CommandFormatError),
            other => Err(Error::BadRequest(format!("unknown connect status: {other}"))),
        }
    }
}
