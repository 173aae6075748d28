//! # mdm-crypto
//!
//! The embedded per-tenant certificate authority and SCEP protocol handler
//! (C6): `GetCACert`/`GetCACaps`/`PKIOperation`, PKCS#7/CMS SignedData and
//! EnvelopedData handling, and the RFC 8894 PrintableString encoding Apple
//! clients require for `messageType`/`pkiStatus`/`failInfo`.
//!
//! ## Security
//!
//! - 100% Rust implementation (RustCrypto `rsa`/`cms`/`der`, no OpenSSL)
//! - The CA private key never leaves process memory as plaintext outside
//!   of the PEM persisted on the tenant row.

pub mod ca;
pub mod oids;
pub mod scep;

pub use ca::{CaError, CaMaterial};
pub use scep::{ParsedRequest, ScepError};
