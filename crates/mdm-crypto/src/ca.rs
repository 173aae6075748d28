//! Per-tenant certificate authority
//!
//! Each tenant lazily gets exactly one self-signed CA (RSA-4096, 10-year
//! validity) the first time it is needed — either a SCEP `GetCACert` or a
//! `PKIOperation` request. The CA is persisted as PEM on the tenant row and
//! is write-once: see `mdm_crypto::ca::load_or_generate` and the tenant
//! store's conditional-INSERT race handling for why it is never rotated
//! automatically.

use der::asn1::BitStringRef;
use der::Encode;
use rand_core::OsRng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose,
    PKCS_RSA_SHA256,
};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroizing;

/// CA key size. Apple's own SCEP implementations tolerate anything RSA
/// clients can parse; 4096 bits matches the conservative end of what
/// enterprise MDM deployments issue for a CA that never rotates.
const CA_KEY_BITS: usize = 4096;

/// CA validity window. `spec.md` requires 10 years.
const CA_VALIDITY_YEARS: i64 = 10;

/// Max path length on the CA's basic-constraints extension: the CA signs
/// leaf device-identity certificates only, never a subordinate CA.
const CA_MAX_PATH_LEN: u8 = 1;

#[derive(Debug, Error)]
pub enum CaError {
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),
    #[error("certificate generation failed: {0}")]
    CertGeneration(String),
    #[error("PEM encoding failed: {0}")]
    Encoding(String),
}

/// PEM-encoded CA certificate and private key, ready to persist on the
/// tenant row via `tenants::set_ca_if_absent` (lazy first-use) or
/// `tenants::update_ca` (explicit admin installation).
pub struct CaMaterial {
    pub cert_pem: String,
    pub key_pem: Zeroizing<String>,
}

/// Generate a brand-new self-signed tenant CA.
///
/// `tenant_name` becomes the CA's Common Name as `"<tenant_name> MDM CA"`,
/// matching the subject Apple's enrollment profile and the admin UI expect
/// (`spec.md` §4.6, scenario 1). The private key is seeded directly from
/// `OsRng` rather than `rand`'s reseeding thread-local generator: this key
/// outlives the process (persisted for the tenant's lifetime), unlike the
/// per-request nonces and serials generated elsewhere in this crate.
pub fn generate(tenant_name: &str) -> Result<CaMaterial, CaError> {
    let rsa_key = RsaPrivateKey::new(&mut OsRng, CA_KEY_BITS)
        .map_err(|e| CaError::KeyGeneration(e.to_string()))?;

    let key_pem = Zeroizing::new(
        rsa_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CaError::Encoding(e.to_string()))?
            .to_string(),
    );

    let pkcs8_der = rsa_key
        .to_pkcs8_der()
        .map_err(|e| CaError::Encoding(e.to_string()))?;

    let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
        &rcgen::PrivatePkcs8KeyDer::from(pkcs8_der.as_bytes()),
        &PKCS_RSA_SHA256,
    )
    .map_err(|e| CaError::KeyGeneration(e.to_string()))?;

    let mut params = CertificateParams::new(Vec::<String>::new())
        .map_err(|e| CaError::CertGeneration(e.to_string()))?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, format!("{tenant_name} MDM CA"));
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(CA_MAX_PATH_LEN));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(365 * CA_VALIDITY_YEARS);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CaError::CertGeneration(e.to_string()))?;

    Ok(CaMaterial {
        cert_pem: cert.pem(),
        key_pem,
    })
}

/// Re-derive the `rcgen` signing identity (certificate + key pair) from the
/// PEM material persisted on the tenant row. Used by the SCEP handler to
/// sign issued device certificates and CertRep envelopes.
pub fn load(cert_pem: &str, key_pem: &str) -> Result<(rcgen::Certificate, KeyPair), CaError> {
    let rsa_key =
        RsaPrivateKey::from_pkcs8_pem(key_pem).map_err(|e| CaError::Encoding(e.to_string()))?;
    let pkcs8_der = rsa_key
        .to_pkcs8_der()
        .map_err(|e| CaError::Encoding(e.to_string()))?;
    let key_pair = KeyPair::from_pkcs8_der_and_sign_algo(
        &rcgen::PrivatePkcs8KeyDer::from(pkcs8_der.as_bytes()),
        &PKCS_RSA_SHA256,
    )
    .map_err(|e| CaError::KeyGeneration(e.to_string()))?;

    let params = rcgen::CertificateParams::from_ca_cert_pem(cert_pem)
        .map_err(|e| CaError::CertGeneration(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CaError::CertGeneration(e.to_string()))?;

    Ok((cert, key_pair))
}

/// Extract the DER bytes of a CA certificate from its PEM form, for
/// embedding in a degenerate PKCS#7 `GetCACert` response.
pub fn cert_der(cert_pem: &str) -> Result<Vec<u8>, CaError> {
    let (_, der) =
        der::pem::decode_vec(cert_pem.as_bytes()).map_err(|e| CaError::Encoding(e.to_string()))?;
    Ok(der)
}

/// Re-encode a raw signature as a DER BIT STRING, used when hand-assembling
/// the SCEP SignedData's `SignerInfo.signature` field outside of `cms`'s
/// typed builders.
pub fn signature_bit_string(signature: &[u8]) -> Result<Vec<u8>, CaError> {
    let bs = BitStringRef::new(0, signature).map_err(|e| CaError::Encoding(e.to_string()))?;
    bs.to_der().map_err(|e| CaError::Encoding(e.to_string()))
}
