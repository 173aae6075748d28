//! Enrollment profile generation (`spec.md` §3, §4.4, §8 scenario 1)
//!
//! The profile bundles three payloads into Apple's "configuration profile"
//! container: the CA root certificate, a SCEP-enrollment payload, and an
//! MDM payload pointing at check-in/Connect. It is generated on demand and
//! never persisted (`spec.md` §3: "Enrollment profile (generated artifact,
//! not stored)").

use plist::{Dictionary, Value};
use uuid::Uuid;

use crate::PlistCodecError;

/// Inputs needed to render a tenant's enrollment profile.
pub struct ProfileParams<'a> {
    pub tenant_id: &'a str,
    pub tenant_name: &'a str,
    pub server_url: &'a str,
    pub apns_topic: &'a str,
    pub ca_cert_der: &'a [u8],
}

/// Render the `application/x-apple-aspen-config` profile document.
///
/// `spec.md` §8's round-trip law requires that the decoded MDM payload's
/// `ServerURL`/`CheckInURL` point at `server_url`, `Topic` equals the
/// tenant's APNs topic, and the SCEP payload's `URL` references the tenant
/// ID — this function is the one place those three facts are assembled.
pub fn build_enrollment_profile(params: &ProfileParams<'_>) -> Result<Vec<u8>, PlistCodecError> {
    let checkin_url = format!("{}/mdm/checkin/{}", params.server_url, params.tenant_id);
    let connect_url = format!("{}/mdm/connect", params.server_url);
    let scep_url = format!("{}/scep/{}?operation=PKIOperation", params.server_url, params.tenant_id);

    let ca_payload = certificate_payload(params.tenant_id, params.ca_cert_der);
    let scep_payload = scep_payload(params.tenant_id, &scep_url);
    let mdm_payload = mdm_payload(params.tenant_id, &checkin_url, &connect_url, params.apns_topic);

    let mut root = Dictionary::new();
    root.insert(
        "PayloadContent".to_string(),
        Value::Array(vec![ca_payload, scep_payload, mdm_payload]),
    );
    root.insert(
        "PayloadDisplayName".to_string(),
        Value::String(format!("{} MDM Enrollment", params.tenant_name)),
    );
    root.insert(
        "PayloadIdentifier".to_string(),
        Value::String(format!("com.fleetcontrolplane.enroll.{}", params.tenant_id)),
    );
    root.insert(
        "PayloadUUID".to_string(),
        Value::String(Uuid::now_v7().to_string().to_uppercase()),
    );
    root.insert("PayloadType".to_string(), Value::String("Configuration".to_string()));
    root.insert("PayloadVersion".to_string(), Value::Integer(1.into()));

    let mut buf = Vec::new();
    plist::to_writer_xml(&mut buf, &Value::Dictionary(root))
        .map_err(|e| PlistCodecError::Encode(e.to_string()))?;
    Ok(buf)
}

fn certificate_payload(tenant_id: &str, ca_cert_der: &[u8]) -> Value {
    let mut dict = Dictionary::new();
    dict.insert(
        "PayloadType".to_string(),
        Value::String("com.apple.security.root".to_string()),
    );
    dict.insert(
        "PayloadIdentifier".to_string(),
        Value::String(format!("com.fleetcontrolplane.enroll.{tenant_id}.ca")),
    );
    dict.insert(
        "PayloadUUID".to_string(),
        Value::String(Uuid::now_v7().to_string().to_uppercase()),
    );
    dict.insert("PayloadVersion".to_string(), Value::Integer(1.into()));
    dict.insert(
        "PayloadContent".to_string(),
        Value::Data(ca_cert_der.to_vec()),
    );
    Value::Dictionary(dict)
}

fn scep_payload(tenant_id: &str, scep_url: &str) -> Value {
    let mut content = Dictionary::new();
    content.insert("URL".to_string(), Value::String(scep_url.to_string()));
    content.insert("Keysize".to_string(), Value::Integer(2048.into()));
    content.insert("KeyType".to_string(), Value::String("RSA".to_string()));
    content.insert("KeyUsage".to_string(), Value::Integer(5.into()));

    let mut dict = Dictionary::new();
    dict.insert(
        "PayloadType".to_string(),
        Value::String("com.apple.security.scep".to_string()),
    );
    dict.insert(
        "PayloadIdentifier".to_string(),
        Value::String(format!("com.fleetcontrolplane.enroll.{tenant_id}.scep")),
    );
    dict.insert(
        "PayloadUUID".to_string(),
        Value::String(Uuid::now_v7().to_string().to_uppercase()),
    );
    dict.insert("PayloadVersion".to_string(), Value::Integer(1.into()));
    dict.insert("PayloadContent".to_string(), Value::Dictionary(content));
    Value::Dictionary(dict)
}

fn mdm_payload(tenant_id: &str, checkin_url: &str, connect_url: &str, apns_topic: &str) -> Value {
    let mut dict = Dictionary::new();
    dict.insert(
        "PayloadType".to_string(),
        Value::String("com.apple.mdm".to_string()),
    );
    dict.insert(
        "PayloadIdentifier".to_string(),
        Value::String(format!("com.fleetcontrolplane.enroll.{tenant_id}.mdm")),
    );
    dict.insert(
        "PayloadUUID".to_string(),
        Value::String(Uuid::now_v7().to_string().to_uppercase()),
    );
    dict.insert("PayloadVersion".to_string(), Value::Integer(1.into()));
    dict.insert(
        "IdentityCertificateUUID".to_string(),
        Value::String(format!("com.fleetcontrolplane.enroll.{tenant_id}.scep")),
    );
    dict.insert("ServerURL".to_string(), Value::String(connect_url.to_string()));
    dict.insert("CheckInURL".to_string(), Value::String(checkin_url.to_string()));
    dict.insert("Topic".to_string(), Value::String(apns_topic.to_string()));
    dict.insert(
        "ServerCapabilities".to_string(),
        Value::Array(vec![Value::String("com.apple.mdm.per-user-connections".to_string())]),
    );
    dict.insert(
        "SignMessage".to_string(),
        Value::Boolean(false),
    );
    dict.insert(
        "CheckOutWhenRemoved".to_string(),
        Value::Boolean(true),
    );
    Value::Dictionary(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(tenant_id: &'static str) -> ProfileParams<'static> {
        ProfileParams {
            tenant_id,
            tenant_name: "Acme",
            server_url: "https://mdm.example.test",
            apns_topic: "com.apple.mgmt.External.acme",
            ca_cert_der: b"fake-der-bytes",
        }
    }

    #[test]
    fn profile_embeds_tenant_scoped_urls_and_topic() {
        let encoded = build_enrollment_profile(&params("T1")).unwrap();
        let value: Value = plist::from_bytes(&encoded).unwrap();
        let root = value.as_dictionary().unwrap();
        let payloads = root.get("PayloadContent").unwrap().as_array().unwrap();

        let mdm = payloads
            .iter()
            .find(|p| {
                p.as_dictionary().unwrap().get("PayloadType").unwrap().as_string()
                    == Some("com.apple.mdm")
            })
            .unwrap()
            .as_dictionary()
            .unwrap();
        assert_eq!(
            mdm.get("ServerURL").unwrap().as_string(),
            Some("https://mdm.example.test/mdm/connect")
        );
        assert_eq!(
            mdm.get("CheckInURL").unwrap().as_string(),
            Some("https://mdm.example.test/mdm/checkin/T1")
        );
        assert_eq!(
            mdm.get("Topic").unwrap().as_string(),
            Some("com.apple.mgmt.External.acme")
        );

        let scep = payloads
            .iter()
            .find(|p| {
                p.as_dictionary().unwrap().get("PayloadType").unwrap().as_string()
                    == Some("com.apple.security.scep")
            })
            .unwrap()
            .as_dictionary()
            .unwrap();
        let scep_content = scep.get("PayloadContent").unwrap().as_dictionary().unwrap();
        assert!(scep_content
            .get("URL")
            .unwrap()
            .as_string()
            .unwrap()
            .contains("/scep/T1"));
    }
}
