//! # mdm-push
//!
//! Per-tenant APNs HTTP/2 push client pool (C5): wakes a device so it
//! re-polls the Connect endpoint. Delivery is at-most-once, best-effort —
//! failures are surfaced to the caller but never retried internally (see
//! `spec.md` §4.5).

pub mod client;

pub use client::{ApnsClientPool, ApnsCredentials, PushError, PushTarget};
