// Route handlers for the MDM control plane (`spec.md` §6 External Interfaces).
//
// Device-facing protocol endpoints (checkin, connect, scep, enroll) and
// admin-facing JSON endpoints (admin_tenants, admin_devices) are kept in
// separate modules; `tenant_resolution` is shared plumbing consumed by
// `checkin`.

pub mod admin_devices;
pub mod admin_tenants;
pub mod checkin;
pub mod connect;
pub mod enroll;
pub mod scep;
pub mod tenant_resolution;
