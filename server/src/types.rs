// Common types for the MDM control plane API

use serde::{Deserialize, Serialize};

/// Admin bearer-token claims (`spec.md` §1 Non-goals: "does not validate
/// admin identity beyond a bearer-token hook").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject — the admin principal.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl JwtClaims {
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.exp
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// W3C Trace Context
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub version: String,
    pub trace_id: String,
    pub parent_id: String,
    pub trace_flags: String,
}

impl TraceContext {
    /// Parse from traceparent header
    /// Format: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
    pub fn from_header(header: &str) -> Result<Self, String> {
        let parts: Vec<&str> = header.split('-').collect();
        if parts.len() != 4 {
            return Err("Invalid traceparent format".to_string());
        }

        Ok(TraceContext {
            version: parts[0].to_string(),
            trace_id: parts[1].to_string(),
            parent_id: parts[2].to_string(),
            trace_flags: parts[3].to_string(),
        })
    }

    /// Format as traceparent header
    pub fn to_header(&self) -> String {
        format!("{}-{}-{}-{}", self.version, self.trace_id, self.parent_id, self.trace_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_claims_expiration() {
        let now = chrono::Utc::now().timestamp();
        let expired = JwtClaims {
            sub: "admin".to_string(),
            exp: now - 100,
            iat: now - 400,
            iss: "mdm-control-plane".to_string(),
        };
        assert!(expired.is_expired());

        let valid = JwtClaims {
            sub: "admin".to_string(),
            exp: now + 300,
            iat: now,
            iss: "mdm-control-plane".to_string(),
        };
        assert!(!valid.is_expired());
    }

    #[test]
    fn trace_context_round_trips() {
        let header = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";
        let ctx = TraceContext::from_header(header).unwrap();
        assert_eq!(ctx.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.to_header(), header);
    }

    #[test]
    fn trace_context_rejects_malformed_header() {
        assert!(TraceContext::from_header("invalid").is_err());
    }
}
