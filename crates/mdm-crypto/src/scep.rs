//! SCEP protocol handler (C6)
//!
//! Implements the three SCEP operations Apple's enrollment clients drive:
//! `GetCACert`, `GetCACaps`, and `PKIOperation` (certificate issuance).
//!
//! The one rule that matters more than any other here: `messageType`,
//! `pkiStatus` and `failInfo` are ASN.1 `PrintableString`, never `INTEGER`.
//! Apple's SCEP client silently rejects a syntactically valid CertRep that
//! encodes these as integers — this module never does that (see
//! [`attrs::printable_string_attr`]).

use cms::cert::CertificateChoices;
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{CertificateSet, SignedData, SignerIdentifier, SignerInfo};
use der::asn1::{OctetStringRef, PrintableStringRef, SetOfVec};
use der::{AnyRef, Decode, Encode};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1v15::{SigningKey, VerifyingKey};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::Digest;
use thiserror::Error;
use zeroize::Zeroizing;
use x509_cert::attr::{Attribute, AttributeValue};
use x509_cert::certificate::Certificate as X509Certificate;
use x509_cert::der::asn1::Uint;
use x509_cert::ext::pkix::{BasicConstraints, ExtendedKeyUsage, KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::{Time, Validity};

use crate::oids;

/// Device-identity certificate validity: `spec.md` §4.6 mandates 365 days.
const DEVICE_CERT_VALIDITY_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum ScepError {
    #[error("malformed SCEP request: {0}")]
    Malformed(String),
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("certificate issuance failed: {0}")]
    IssuanceFailed(String),
}

/// A parsed, decrypted `PKIOperation` request.
pub struct ParsedRequest {
    pub transaction_id: Vec<u8>,
    pub sender_nonce: Vec<u8>,
    /// DER-encoded PKCS#10 CertificationRequest extracted from the
    /// decrypted EnvelopedData.
    pub csr_der: Vec<u8>,
    /// DER-encoded certificate of the requester, taken from the outer
    /// SignedData's certificate set — used to encrypt the CertRep back to
    /// the requester (spec.md §4.6 step 6).
    pub requester_cert_der: Vec<u8>,
}

/// GetCACaps: the plain-text capability list Apple's enrollment client
/// queries before attempting `PKIOperation`.
pub fn get_ca_caps() -> &'static str {
    "POSTPKIOperation\nSHA-256\nAES\nSCEPStandard\n"
}

/// GetCACert: wrap the tenant CA certificate in a degenerate PKCS#7
/// SignedData (no signers, a single certificate) — the conventional SCEP
/// CA-certificate container.
pub fn build_ca_cert_response(ca_cert_der: &[u8]) -> Result<Vec<u8>, ScepError> {
    let cert = X509Certificate::from_der(ca_cert_der)
        .map_err(|e| ScepError::Malformed(format!("CA cert DER: {e}")))?;

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::new(),
        encap_content_info: degenerate_content_info()?,
        certificates: Some(CertificateSet(
            [CertificateChoices::Certificate(cert)]
                .into_iter()
                .collect(),
        )),
        crls: None,
        signer_infos: der::asn1::SetOfVec::new(),
    };

    wrap_content_info(&signed_data)
}

/// `PKIOperation`: parse, decrypt, verify and issue, then build a signed
/// CertRep. Any failure along the way is mapped to a SCEP FAILURE response
/// (never an HTTP error — `spec.md` §7).
pub fn handle_pki_operation(
    raw_request: &[u8],
    ca_cert_pem: &str,
    ca_key_pem: &str,
    tenant_name: &str,
) -> Result<Vec<u8>, ScepError> {
    let parsed = parse_pki_operation_request(raw_request, ca_key_pem)?;

    let issue_result = (|| -> Result<Vec<u8>, ScepError> {
        let csr = CertReq::from_der(&parsed.csr_der)
            .map_err(|e| ScepError::Malformed(format!("CSR DER: {e}")))?;
        verify_csr_signature(&csr)?;
        issue_device_certificate(&csr, ca_cert_pem, ca_key_pem, tenant_name)
    })();

    match issue_result {
        Ok(device_cert_der) => build_cert_rep_success(
            &parsed,
            &device_cert_der,
            ca_cert_pem,
            ca_key_pem,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "SCEP PKIOperation failed, returning CertRep FAILURE");
            build_cert_rep_failure(&parsed, ca_cert_pem, ca_key_pem)
        }
    }
}

// ---------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------

fn parse_pki_operation_request(
    raw: &[u8],
    ca_key_pem: &str,
) -> Result<ParsedRequest, ScepError> {
    let content_info =
        ContentInfo::from_der(raw).map_err(|e| ScepError::Malformed(format!("outer CMS: {e}")))?;
    let signed_data: SignedData = content_info
        .content
        .decode_as()
        .map_err(|e| ScepError::Malformed(format!("SignedData: {e}")))?;

    let signer_info = signed_data
        .signer_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| ScepError::Malformed("SignedData has no signer".to_string()))?;

    let transaction_id = find_attr_octets(signer_info, oids::TRANSACTION_ID)?;
    let message_type = find_attr_printable(signer_info, oids::MESSAGE_TYPE)?;
    if message_type != oids::MSG_TYPE_PKCS_REQ {
        return Err(ScepError::Malformed(format!(
            "unexpected messageType {message_type}, expected PKCSReq"
        )));
    }
    let sender_nonce = find_attr_octets(signer_info, oids::SENDER_NONCE)?;

    let requester_cert_der = signed_data
        .certificates
        .as_ref()
        .and_then(|set| set.0.iter().next())
        .and_then(|c| match c {
            CertificateChoices::Certificate(cert) => cert.to_der().ok(),
            _ => None,
        })
        .ok_or_else(|| ScepError::Malformed("no requester certificate in SignedData".to_string()))?;

    // The encapsulated content is itself a degenerate-free EnvelopedData
    // encrypted to the CA's public key (spec.md §4.6 step 2).
    let enveloped_der = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| ScepError::Malformed("missing encapsulated content".to_string()))?
        .value()
        .to_vec();

    let csr_der = decrypt_enveloped_data(&enveloped_der, ca_key_pem)?;

    Ok(ParsedRequest {
        transaction_id,
        sender_nonce,
        csr_der,
        requester_cert_der,
    })
}

/// Decrypt a PKCS#7 EnvelopedData addressed to the CA: the content
/// encryption key is RSA-PKCS1v15-encrypted to the CA's public key, and the
/// payload is AES-CBC encrypted under that key.
fn decrypt_enveloped_data(enveloped_der: &[u8], ca_key_pem: &str) -> Result<Vec<u8>, ScepError> {
    use cms::enveloped_data::EnvelopedData;

    let enveloped = EnvelopedData::from_der(enveloped_der)
        .map_err(|e| ScepError::Malformed(format!("EnvelopedData: {e}")))?;

    let recipient = enveloped
        .recip_infos
        .0
        .iter()
        .next()
        .ok_or_else(|| ScepError::Malformed("EnvelopedData has no recipient".to_string()))?;

    let ca_key = RsaPrivateKey::from_pkcs8_pem(ca_key_pem)
        .map_err(|e| ScepError::DecryptionFailed(format!("CA key: {e}")))?;

    let encrypted_key = match recipient {
        cms::enveloped_data::RecipientInfo::Ktri(ktri) => ktri.enc_key.as_bytes().to_vec(),
        _ => return Err(ScepError::Malformed("unsupported RecipientInfo variant".to_string())),
    };

    let content_encryption_key = Zeroizing::new(
        ca_key
            .decrypt(Pkcs1v15Encrypt, &encrypted_key)
            .map_err(|e| ScepError::DecryptionFailed(format!("CEK unwrap: {e}")))?,
    );

    let encrypted_content = enveloped
        .enc_content_info
        .encrypted_content
        .as_ref()
        .ok_or_else(|| ScepError::Malformed("EnvelopedData missing encrypted content".to_string()))?
        .as_bytes()
        .to_vec();

    let iv = enveloped
        .enc_content_info
        .content_enc_alg
        .parameters
        .as_ref()
        .ok_or_else(|| ScepError::Malformed("missing AES IV parameter".to_string()))?
        .value()
        .to_vec();

    decrypt_aes_cbc(content_encryption_key.as_slice(), &iv, &encrypted_content)
        .map_err(|e| ScepError::DecryptionFailed(e.to_string()))
}

fn decrypt_aes_cbc(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, String> {
    use aes::Aes256;
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    let decryptor = Aes256CbcDec::new_from_slices(key, iv).map_err(|e| e.to_string())?;
    decryptor
        .decrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(ciphertext)
        .map_err(|e| e.to_string())
}

fn find_attr_octets(
    signer_info: &SignerInfo,
    oid: der::oid::ObjectIdentifier,
) -> Result<Vec<u8>, ScepError> {
    let attr = find_attr(signer_info, oid)?;
    let octets: OctetStringRef = attr
        .values
        .iter()
        .next()
        .ok_or_else(|| ScepError::Malformed(format!("empty attribute {oid}")))?
        .decode_as()
        .map_err(|e| ScepError::Malformed(format!("attribute {oid} not OCTET STRING: {e}")))?;
    Ok(octets.as_bytes().to_vec())
}

fn find_attr_printable(
    signer_info: &SignerInfo,
    oid: der::oid::ObjectIdentifier,
) -> Result<String, ScepError> {
    let attr = find_attr(signer_info, oid)?;
    let s: PrintableStringRef = attr
        .values
        .iter()
        .next()
        .ok_or_else(|| ScepError::Malformed(format!("empty attribute {oid}")))?
        .decode_as()
        .map_err(|e| ScepError::Malformed(format!("attribute {oid} not PrintableString: {e}")))?;
    Ok(s.as_str().to_string())
}

fn find_attr<'a>(
    signer_info: &'a SignerInfo,
    oid: der::oid::ObjectIdentifier,
) -> Result<&'a Attribute, ScepError> {
    signer_info
        .signed_attrs
        .as_ref()
        .and_then(|attrs| attrs.iter().find(|a| a.oid == oid))
        .ok_or_else(|| ScepError::Malformed(format!("missing required attribute {oid}")))
}

// ---------------------------------------------------------------------
// CSR verification and certificate issuance
// ---------------------------------------------------------------------

fn verify_csr_signature(csr: &CertReq) -> Result<(), ScepError> {
    let spki = &csr.info.public_key;
    let public_key = RsaPublicKey::try_from(spki.clone())
        .map_err(|e| ScepError::SignatureInvalid(format!("unsupported CSR public key: {e}")))?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key);
    let tbs_der = csr
        .info
        .to_der()
        .map_err(|e| ScepError::Malformed(format!("CSR info re-encode: {e}")))?;

    let sig_bytes = csr.signature.as_bytes().ok_or_else(|| {
        ScepError::Malformed("CSR signature is not a whole number of bytes".to_string())
    })?;
    let signature = rsa::pkcs1v15::Signature::try_from(sig_bytes)
        .map_err(|e| ScepError::SignatureInvalid(e.to_string()))?;

    verifying_key
        .verify(&tbs_der, &signature)
        .map_err(|e| ScepError::SignatureInvalid(format!("CSR self-signature: {e}")))
}

fn issue_device_certificate(
    csr: &CertReq,
    ca_cert_pem: &str,
    ca_key_pem: &str,
    _tenant_name: &str,
) -> Result<Vec<u8>, ScepError> {
    let (ca_cert_der, ca_key) = load_ca_signing_identity(ca_cert_pem, ca_key_pem)?;
    let ca_cert = X509Certificate::from_der(&ca_cert_der)
        .map_err(|e| ScepError::Malformed(format!("CA cert DER: {e}")))?;

    let mut serial_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut serial_bytes);
    // Ensure a positive INTEGER encoding.
    serial_bytes[0] &= 0x7f;

    let not_before = x509_cert::der::DateTime::from_unix_duration(std::time::Duration::from_secs(
        now_unix_seconds(),
    ))
    .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?;
    let not_after = x509_cert::der::DateTime::from_unix_duration(std::time::Duration::from_secs(
        now_unix_seconds() + (DEVICE_CERT_VALIDITY_DAYS as u64) * 86_400,
    ))
    .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?;

    let key_usage = KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment);
    let eku = ExtendedKeyUsage(vec![const_oid::db::rfc5280::ID_KP_CLIENT_AUTH]);
    let basic_constraints = BasicConstraints {
        ca: false,
        path_len_constraint: None,
    };

    let tbs = x509_cert::TbsCertificate {
        version: x509_cert::Version::V3,
        serial_number: SerialNumber::new(&serial_bytes)
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?,
        signature: ca_cert.tbs_certificate.signature.clone(),
        issuer: ca_cert.tbs_certificate.subject.clone(),
        validity: Validity {
            not_before: Time::GeneralTime(not_after_generalized(not_before)?),
            not_after: Time::GeneralTime(not_after_generalized(not_after)?),
        },
        subject: csr.info.subject.clone(),
        subject_public_key_info: csr.info.public_key.clone(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(vec![
            extension(const_oid::db::rfc5280::ID_CE_KEY_USAGE, &key_usage)?,
            extension(const_oid::db::rfc5280::ID_CE_EXT_KEY_USAGE, &eku)?,
            extension(
                const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS,
                &basic_constraints,
            )?,
        ]),
    };

    let signing_key = SigningKey::<Sha256>::new(ca_key);
    let tbs_der = tbs
        .to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("tbsCertificate encode: {e}")))?;
    let signature: rsa::pkcs1v15::Signature =
        signing_key.sign_with_rng(&mut rand::thread_rng(), &tbs_der);

    let cert = X509Certificate {
        tbs_certificate: tbs,
        signature_algorithm: ca_cert.tbs_certificate.signature.clone(),
        signature: der::asn1::BitString::from_bytes(&signature.to_bytes())
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?,
    };

    cert.to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("certificate encode: {e}")))
}

fn not_after_generalized(
    dt: x509_cert::der::DateTime,
) -> Result<x509_cert::der::asn1::GeneralizedTime, ScepError> {
    x509_cert::der::asn1::GeneralizedTime::from_date_time(dt)
        .map_err(|e| ScepError::IssuanceFailed(e.to_string()))
}

fn extension<T: der::Encode>(oid: der::oid::ObjectIdentifier, value: &T) -> Result<Extension, ScepError> {
    let der_bytes = value
        .to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("extension {oid} encode: {e}")))?;
    Ok(Extension {
        extn_id: oid,
        critical: false,
        extn_value: der::asn1::OctetString::new(der_bytes)
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?,
    })
}

fn load_ca_signing_identity(
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<(Vec<u8>, RsaPrivateKey), ScepError> {
    let der = crate::ca::cert_der(ca_cert_pem).map_err(|e| ScepError::Malformed(e.to_string()))?;
    let key = RsaPrivateKey::from_pkcs8_pem(ca_key_pem)
        .map_err(|e| ScepError::Malformed(format!("CA key: {e}")))?;
    Ok((der, key))
}

fn now_unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ---------------------------------------------------------------------
// CertRep construction
// ---------------------------------------------------------------------

fn build_cert_rep_success(
    request: &ParsedRequest,
    device_cert_der: &[u8],
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<Vec<u8>, ScepError> {
    let degenerate = build_degenerate_pkcs7(device_cert_der)?;
    let encrypted = encrypt_for_requester(&degenerate, &request.requester_cert_der)?;
    sign_cert_rep(
        request,
        &encrypted,
        oids::PKI_STATUS_SUCCESS,
        None,
        ca_cert_pem,
        ca_key_pem,
    )
}

fn build_cert_rep_failure(
    request: &ParsedRequest,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<Vec<u8>, ScepError> {
    // FAILURE responses carry no encrypted content — only the status and
    // failInfo attributes need to be signed.
    sign_cert_rep(
        request,
        &[],
        oids::PKI_STATUS_FAILURE,
        Some("2"), // badRequest, per RFC 8894 FailInfo
        ca_cert_pem,
        ca_key_pem,
    )
}

fn sign_cert_rep(
    request: &ParsedRequest,
    encrypted_content: &[u8],
    pki_status: &str,
    fail_info: Option<&str>,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> Result<Vec<u8>, ScepError> {
    let (ca_cert_der, ca_key) = load_ca_signing_identity(ca_cert_pem, ca_key_pem)?;
    let ca_cert = X509Certificate::from_der(&ca_cert_der)
        .map_err(|e| ScepError::Malformed(format!("CA cert DER: {e}")))?;

    let mut fresh_sender_nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut fresh_sender_nonce);

    let mut signed_attrs = Vec::new();
    signed_attrs.push(printable_string_attr(oids::MESSAGE_TYPE, oids::MSG_TYPE_CERT_REP)?);
    signed_attrs.push(octet_string_attr(oids::TRANSACTION_ID, &request.transaction_id)?);
    signed_attrs.push(printable_string_attr(oids::PKI_STATUS, pki_status)?);
    signed_attrs.push(octet_string_attr(oids::SENDER_NONCE, &fresh_sender_nonce)?);
    signed_attrs.push(octet_string_attr(oids::RECIPIENT_NONCE, &request.sender_nonce)?);
    if let Some(fail) = fail_info {
        signed_attrs.push(printable_string_attr(oids::FAIL_INFO, fail)?);
    }

    let encap_content = if encrypted_content.is_empty() {
        degenerate_content_info()?
    } else {
        cms::signed_data::EncapsulatedContentInfo {
            econtent_type: const_oid::db::rfc5911::ID_DATA,
            econtent: Some(
                AnyRef::new(der::Tag::OctetString, encrypted_content)
                    .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?
                    .to_owned(),
            ),
        }
    };

    let signing_key = SigningKey::<Sha256>::new(ca_key);
    let signed_attrs_der = encode_signed_attrs_for_signing(&signed_attrs)?;
    let signature: rsa::pkcs1v15::Signature =
        signing_key.sign_with_rng(&mut rand::thread_rng(), &signed_attrs_der);

    let digest_oid = const_oid::db::rfc5912::ID_SHA_256;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(cms::cert::IssuerAndSerialNumber {
            issuer: ca_cert.tbs_certificate.subject.clone(),
            serial_number: ca_cert.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: der::asn1::AlgorithmIdentifierOwned {
            oid: digest_oid,
            parameters: None,
        },
        signed_attrs: attrs_to_set(signed_attrs)?,
        signature_algorithm: ca_cert.tbs_certificate.signature.clone(),
        signature: der::asn1::OctetString::new(signature.to_bytes().to_vec())
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?
            .into(),
        unsigned_attrs: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: [der::asn1::AlgorithmIdentifierOwned {
            oid: digest_oid,
            parameters: None,
        }]
        .into_iter()
        .collect(),
        encap_content_info: encap_content,
        certificates: Some(CertificateSet(
            [CertificateChoices::Certificate(ca_cert)].into_iter().collect(),
        )),
        crls: None,
        signer_infos: [signer_info].into_iter().collect(),
    };

    wrap_content_info(&signed_data)
}

/// Encrypt the degenerate PKCS#7 response for the original requester: an
/// RSA-wrapped AES-256 key plus AES-CBC ciphertext, mirrored in a
/// PKCS#7 EnvelopedData — the same shape the request used in reverse.
fn encrypt_for_requester(plaintext: &[u8], requester_cert_der: &[u8]) -> Result<Vec<u8>, ScepError> {
    use aes::Aes256;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};
    use cbc::cipher::block_padding::Pkcs7;

    let requester_cert = X509Certificate::from_der(requester_cert_der)
        .map_err(|e| ScepError::Malformed(format!("requester cert DER: {e}")))?;
    let requester_key = RsaPublicKey::try_from(requester_cert.tbs_certificate.subject_public_key_info.clone())
        .map_err(|e| ScepError::DecryptionFailed(format!("requester public key: {e}")))?;

    // The CEK wraps this response's cleartext; OsRng sources it directly
    // rather than through `rand`'s reseeding thread-local generator, and it
    // is wiped from memory as soon as it goes out of scope.
    let mut cek = Zeroizing::new([0u8; 32]);
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(cek.as_mut());
    rand::thread_rng().fill_bytes(&mut iv);

    type Aes256CbcEnc = cbc::Encryptor<Aes256>;
    let encryptor = Aes256CbcEnc::new_from_slices(cek.as_slice(), &iv)
        .map_err(|e| ScepError::DecryptionFailed(e.to_string()))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let encrypted_key = requester_key
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, cek.as_slice())
        .map_err(|e| ScepError::DecryptionFailed(format!("CEK wrap: {e}")))?;

    build_enveloped_data(&requester_cert, &encrypted_key, &iv, &ciphertext)
}

fn build_enveloped_data(
    recipient_cert: &X509Certificate,
    encrypted_key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, ScepError> {
    use cms::enveloped_data::{
        EncryptedContentInfo, EnvelopedData, KeyTransRecipientInfo, RecipientIdentifier,
        RecipientInfo,
    };

    let ktri = KeyTransRecipientInfo {
        version: CmsVersion::V0,
        rid: RecipientIdentifier::IssuerAndSerialNumber(cms::cert::IssuerAndSerialNumber {
            issuer: recipient_cert.tbs_certificate.issuer.clone(),
            serial_number: recipient_cert.tbs_certificate.serial_number.clone(),
        }),
        key_enc_alg: der::asn1::AlgorithmIdentifierOwned {
            oid: const_oid::db::rfc5912::RSA_ENCRYPTION,
            parameters: None,
        },
        enc_key: der::asn1::OctetString::new(encrypted_key.to_vec())
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?,
    };

    let enveloped = EnvelopedData {
        version: CmsVersion::V0,
        originator_info: None,
        recip_infos: [RecipientInfo::Ktri(ktri)].into_iter().collect(),
        enc_content_info: EncryptedContentInfo {
            content_type: const_oid::db::rfc5911::ID_DATA,
            content_enc_alg: der::asn1::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5911::AES_256_CBC,
                parameters: Some(
                    AnyRef::new(der::Tag::OctetString, iv)
                        .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?
                        .to_owned(),
                ),
            },
            encrypted_content: Some(
                der::asn1::OctetString::new(ciphertext.to_vec())
                    .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?,
            ),
        },
        unprotected_attrs: None,
    };

    enveloped
        .to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("EnvelopedData encode: {e}")))
}

fn build_degenerate_pkcs7(cert_der: &[u8]) -> Result<Vec<u8>, ScepError> {
    build_ca_cert_response(cert_der)
}

fn degenerate_content_info() -> Result<cms::signed_data::EncapsulatedContentInfo, ScepError> {
    Ok(cms::signed_data::EncapsulatedContentInfo {
        econtent_type: const_oid::db::rfc5911::ID_DATA,
        econtent: None,
    })
}

fn wrap_content_info(signed_data: &SignedData) -> Result<Vec<u8>, ScepError> {
    let content = signed_data
        .to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("SignedData encode: {e}")))?;
    let content_info = ContentInfo {
        content_type: const_oid::db::rfc5911::ID_SIGNED_DATA,
        content: AnyRef::new(der::Tag::Sequence, &content)
            .map_err(|e| ScepError::IssuanceFailed(e.to_string()))?
            .to_owned(),
    };
    content_info
        .to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("ContentInfo encode: {e}")))
}

fn printable_string_attr(
    oid: der::oid::ObjectIdentifier,
    value: &str,
) -> Result<Attribute, ScepError> {
    let s = PrintableStringRef::new(value).map_err(|e| ScepError::IssuanceFailed(e.to_string()))?;
    let any = AnyRef::from(s).to_owned();
    Ok(Attribute {
        oid,
        values: [AttributeValue::try_from(any).map_err(|e| ScepError::IssuanceFailed(e.to_string()))?]
            .into_iter()
            .collect(),
    })
}

fn octet_string_attr(oid: der::oid::ObjectIdentifier, value: &[u8]) -> Result<Attribute, ScepError> {
    let os = der::asn1::OctetStringRef::new(value).map_err(|e| ScepError::IssuanceFailed(e.to_string()))?;
    let any = AnyRef::from(os).to_owned();
    Ok(Attribute {
        oid,
        values: [AttributeValue::try_from(any).map_err(|e| ScepError::IssuanceFailed(e.to_string()))?]
            .into_iter()
            .collect(),
    })
}

fn attrs_to_set(
    attrs: Vec<Attribute>,
) -> Result<cms::signed_data::SignedAttributes, ScepError> {
    attrs
        .into_iter()
        .collect::<der::asn1::SetOfVec<Attribute>>()
        .try_into()
        .map_err(|_| ScepError::IssuanceFailed("signed attribute set too large".to_string()))
}

/// Signed attributes are signed in their `SET OF` DER encoding (RFC 5652
/// §5.4), not the implicit-tagged `[0]` form used inside the SignerInfo.
fn encode_signed_attrs_for_signing(attrs: &[Attribute]) -> Result<Vec<u8>, ScepError> {
    let set: der::asn1::SetOfVec<Attribute> = attrs.iter().cloned().collect();
    set.to_der()
        .map_err(|e| ScepError::IssuanceFailed(format!("signed attrs encode: {e}")))
}
