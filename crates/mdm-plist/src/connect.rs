//! Connect status-report decoding and command-payload encoding
//! (`spec.md` §4.4)

use std::collections::BTreeMap;

use plist::{Dictionary, Value};

use crate::{get_data, get_string, get_string_opt, PlistCodecError};

/// The `Status` field of a Connect status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Idle,
    Acknowledged,
    Error,
    NotNow,
    CommandFormatError,
}

impl ReportedStatus {
    fn parse(s: &str) -> Result<Self, PlistCodecError> {
        match s {
            "Idle" => Ok(Self::Idle),
            "Acknowledged" => Ok(Self::Acknowledged),
            "Error" => Ok(Self::Error),
            "NotNow" => Ok(Self::NotNow),
            "CommandFormatError" => Ok(Self::CommandFormatError),
            other => Err(PlistCodecError::BadFieldType(format!(
                "unknown Connect Status {other}"
            ))),
        }
    }
}

/// A decoded Connect status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub udid: String,
    pub status: ReportedStatus,
    /// Present when `status != Idle`: the command being reported on.
    pub command_uuid: Option<String>,
    /// Device-supplied diagnostics, present on `Status=Error`.
    pub error_chain: Option<String>,
    /// Raw `QueryResponses` dictionary from a `DeviceInformation` reply, if
    /// this report carries one — consumed by `update_device_info` (C2).
    pub query_responses: Option<BTreeMap<String, String>>,
}

impl StatusReport {
    fn is_idle(&self) -> bool {
        matches!(self.status, ReportedStatus::Idle)
    }

    pub fn status(&self) -> ReportedStatus {
        self.status
    }
}

/// Decode a Connect status-report body.
pub fn decode(body: &[u8]) -> Result<StatusReport, PlistCodecError> {
    let value: Value =
        plist::from_bytes(body).map_err(|e| PlistCodecError::Decode(e.to_string()))?;
    let dict = value
        .as_dictionary()
        .ok_or_else(|| PlistCodecError::Decode("Connect body is not a dictionary".to_string()))?;

    let udid = get_string(dict, "UDID")?;
    let status = ReportedStatus::parse(&get_string(dict, "Status")?)?;
    let command_uuid = get_string_opt(dict, "CommandUUID");
    let error_chain = dict.get("ErrorChain").map(|v| format!("{v:?}"));

    let query_responses = dict.get("QueryResponses").and_then(|v| v.as_dictionary()).map(|qr| {
        qr.iter()
            .map(|(k, v)| (k.clone(), plist_value_to_string(v)))
            .collect()
    });

    let report = StatusReport {
        udid,
        status,
        command_uuid,
        error_chain,
        query_responses,
    };

    if !report.is_idle() && report.command_uuid.is_none() {
        return Err(PlistCodecError::MissingField(
            "CommandUUID required when Status is not Idle".to_string(),
        ));
    }

    Ok(report)
}

fn plist_value_to_string(v: &Value) -> String {
    if let Some(s) = v.as_string() {
        s.to_string()
    } else if let Some(b) = v.as_boolean() {
        b.to_string()
    } else if let Some(i) = v.as_signed_integer() {
        i.to_string()
    } else {
        format!("{v:?}")
    }
}

/// A command ready to be delivered in a Connect response.
pub struct CommandPayload {
    pub command_uuid: String,
    pub request_type: String,
    /// Request-type-specific parameters, merged into the `Command`
    /// dictionary alongside `RequestType`.
    pub params: BTreeMap<String, String>,
}

/// Encode the `{CommandUUID, Command: {RequestType, ...}}` XML-plist
/// response body delivered when a command is pending (`spec.md` §4.4 step
/// 6).
pub fn encode_command(payload: &CommandPayload) -> Result<Vec<u8>, PlistCodecError> {
    let mut command = Dictionary::new();
    command.insert(
        "RequestType".to_string(),
        Value::String(payload.request_type.clone()),
    );
    for (k, v) in &payload.params {
        command.insert(k.clone(), Value::String(v.clone()));
    }

    let mut root = Dictionary::new();
    root.insert(
        "CommandUUID".to_string(),
        Value::String(payload.command_uuid.clone()),
    );
    root.insert("Command".to_string(), Value::Dictionary(command));

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(root))
        .map_err(|e| PlistCodecError::Encode(e.to_string()))?;
    Ok(buf)
}
