//! # mdm-plist
//!
//! Apple property-list encoding/decoding for the Check-in and Connect
//! endpoints (C4) and for the generated enrollment profile (`spec.md` §3).
//! No crate in the retrieval pack serializes Apple's plist wire format —
//! `plist` is the canonical real-world crate for it and is adopted here
//! rather than hand-rolling binary/XML plist parsing.

pub mod checkin;
pub mod connect;
pub mod profile;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlistCodecError {
    #[error("plist decode failed: {0}")]
    Decode(String),
    #[error("plist encode failed: {0}")]
    Encode(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("unexpected value type for field: {0}")]
    BadFieldType(String),
}

pub(crate) fn get_string(dict: &plist::Dictionary, key: &str) -> Result<String, PlistCodecError> {
    dict.get(key)
        .ok_or_else(|| PlistCodecError::MissingField(key.to_string()))?
        .as_string()
        .map(str::to_string)
        .ok_or_else(|| PlistCodecError::BadFieldType(key.to_string()))
}

pub(crate) fn get_string_opt(dict: &plist::Dictionary, key: &str) -> Option<String> {
    dict.get(key).and_then(|v| v.as_string()).map(str::to_string)
}

pub(crate) fn get_data(dict: &plist::Dictionary, key: &str) -> Result<Vec<u8>, PlistCodecError> {
    dict.get(key)
        .ok_or_else(|| PlistCodecError::MissingField(key.to_string()))?
        .as_data()
        .map(|d| d.to_vec())
        .ok_or_else(|| PlistCodecError::BadFieldType(key.to_string()))
}
