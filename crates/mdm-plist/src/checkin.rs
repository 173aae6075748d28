//! Check-in message decoding (`spec.md` §4.4)
//!
//! Apple devices POST one of three message shapes to the check-in endpoint,
//! discriminated by `MessageType`. This module only decodes the fields C4
//! actually consumes — check-in payloads carry other Apple-defined keys
//! (e.g. `Challenge`, `Topic`) that are read individually where needed
//! rather than modeled exhaustively.

use plist::Value;

use crate::{get_data, get_string, get_string_opt, PlistCodecError};

/// The `MessageType` discriminator of a check-in request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinMessage {
    Authenticate(AuthenticateMessage),
    TokenUpdate(TokenUpdateMessage),
    CheckOut(CheckOutMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateMessage {
    pub udid: String,
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub build_version: Option<String>,
    pub product_name: Option<String>,
    pub device_name: Option<String>,
    /// `Topic` field, used for best-effort tenant resolution (`spec.md` §4.4).
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenUpdateMessage {
    pub udid: String,
    /// Raw device token bytes; the caller hex-encodes before storage.
    pub token: Vec<u8>,
    pub push_magic: String,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutMessage {
    pub udid: String,
}

/// Decode a check-in request body (XML or binary plist) into its typed
/// message. Returns `PlistCodecError::BadFieldType` for an unrecognized
/// `MessageType` — the route maps this to HTTP 400.
pub fn decode(body: &[u8]) -> Result<CheckinMessage, PlistCodecError> {
    let value: Value =
        plist::from_bytes(body).map_err(|e| PlistCodecError::Decode(e.to_string()))?;
    let dict = value
        .as_dictionary()
        .ok_or_else(|| PlistCodecError::Decode("check-in body is not a dictionary".to_string()))?;

    let message_type = get_string(dict, "MessageType")?;
    let udid = get_string(dict, "UDID")?;

    match message_type.as_str() {
        "Authenticate" => Ok(CheckinMessage::Authenticate(AuthenticateMessage {
            udid,
            serial_number: get_string_opt(dict, "SerialNumber"),
            model: get_string_opt(dict, "Model"),
            os_version: get_string_opt(dict, "OSVersion"),
            build_version: get_string_opt(dict, "BuildVersion"),
            product_name: get_string_opt(dict, "ProductName"),
            device_name: get_string_opt(dict, "DeviceName"),
            topic: get_string_opt(dict, "Topic"),
        })),
        "TokenUpdate" => Ok(CheckinMessage::TokenUpdate(TokenUpdateMessage {
            udid,
            token: get_data(dict, "Token")?,
            push_magic: get_string(dict, "PushMagic")?,
            topic: get_string_opt(dict, "Topic"),
        })),
        "CheckOut" => Ok(CheckinMessage::CheckOut(CheckOutMessage { udid })),
        other => Err(PlistCodecError::BadFieldType(format!(
            "unknown MessageType {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xml_plist(body: &str) -> Vec<u8> {
        body.as_bytes().to_vec()
    }

    #[test]
    fn decodes_authenticate() {
        let body = xml_plist(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>Authenticate</string>
    <key>UDID</key><string>UDID-001</string>
    <key>SerialNumber</key><string>SN001</string>
    <key>Model</key><string>iPhone14,2</string>
</dict>
</plist>"#,
        );
        let msg = decode(&body).unwrap();
        match msg {
            CheckinMessage::Authenticate(a) => {
                assert_eq!(a.udid, "UDID-001");
                assert_eq!(a.serial_number.as_deref(), Some("SN001"));
            }
            _ => panic!("expected Authenticate"),
        }
    }

    #[test]
    fn decodes_token_update_with_data() {
        let body = xml_plist(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>TokenUpdate</string>
    <key>UDID</key><string>UDID-001</string>
    <key>Token</key><data>AQIDBAUGBwg=</data>
    <key>PushMagic</key><string>magic-abc</string>
</dict>
</plist>"#,
        );
        let msg = decode(&body).unwrap();
        match msg {
            CheckinMessage::TokenUpdate(t) => {
                assert_eq!(t.token, vec![1, 2, 3, 4, 5, 6, 7, 8]);
                assert_eq!(t.push_magic, "magic-abc");
            }
            _ => panic!("expected TokenUpdate"),
        }
    }

    #[test]
    fn decodes_checkout() {
        let body = xml_plist(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>CheckOut</string>
    <key>UDID</key><string>UDID-001</string>
</dict>
</plist>"#,
        );
        assert!(matches!(decode(&body).unwrap(), CheckinMessage::CheckOut(_)));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let body = xml_plist(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>MessageType</key><string>Bogus</string>
    <key>UDID</key><string>UDID-001</string>
</dict>
</plist>"#,
        );
        assert!(decode(&body).is_err());
    }
}
