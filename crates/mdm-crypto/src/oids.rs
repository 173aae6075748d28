//! SCEP-specific ASN.1 object identifiers
//!
//! These are the `pkcs9-at` arc under Cisco's historical SCEP allocation
//! (`2.16.840.1.113733.1.9`), used as authenticated attributes in the
//! SignedData wrapping both PKIOperation requests and CertRep responses.

use const_oid::ObjectIdentifier;

/// `transactionID` — correlates a PKIOperation request with its response.
pub const TRANSACTION_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.7");

/// `messageType` — `"19"` (PKCSReq) on requests, `"3"` (CertRep) on responses.
pub const MESSAGE_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.2");

/// `pkiStatus` — `"0"` SUCCESS, `"2"` FAILURE, `"3"` PENDING.
pub const PKI_STATUS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.3");

/// `senderNonce` — 16 random bytes, fresh on every message.
pub const SENDER_NONCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.5");

/// `recipientNonce` — echoes the peer's `senderNonce` from the prior message.
pub const RECIPIENT_NONCE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.6");

/// `failInfo` — present only when `pkiStatus` is FAILURE.
pub const FAIL_INFO: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.113733.1.9.4");

/// `messageType` literal value for a certificate-issuance request.
pub const MSG_TYPE_PKCS_REQ: &str = "19";
/// `messageType` literal value for a certificate-issuance response.
pub const MSG_TYPE_CERT_REP: &str = "3";

pub const PKI_STATUS_SUCCESS: &str = "0";
pub const PKI_STATUS_FAILURE: &str = "2";
