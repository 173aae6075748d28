// Forwarded client-certificate identity extraction
//
// `spec.md` §1 Non-goals: "the core does not itself terminate TLS for
// device connections ... mTLS client-cert extraction is an injected
// concern." An external reverse proxy terminates the device-facing mTLS
// handshake and forwards the verified client certificate's subject in a
// header; this middleware only reads that header and makes it available
// to the Check-in handler for tenant resolution (`spec.md` §4.4 step 3).
// It performs no certificate verification itself — that already happened
// at the proxy.

use axum::{extract::Request, middleware::Next, response::Response};

/// Header the external TLS-terminating proxy is expected to set after
/// verifying the device's client certificate.
pub const FORWARDED_CLIENT_CERT_SUBJECT_HEADER: &str = "x-client-cert-subject";

/// The verified device-certificate subject forwarded by the proxy, if
/// present. Inserted into request extensions for handlers to read.
#[derive(Debug, Clone)]
pub struct ForwardedClientCertSubject(pub String);

/// Extract the forwarded client-certificate subject header, if present,
/// and attach it to the request's extensions.
pub async fn forwarded_client_cert_middleware(mut request: Request, next: Next) -> Response {
    if let Some(subject) = request
        .headers()
        .get(FORWARDED_CLIENT_CERT_SUBJECT_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
    {
        request
            .extensions_mut()
            .insert(ForwardedClientCertSubject(subject));
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn echo_subject(
        axum::extract::Extension(subject): axum::extract::Extension<ForwardedClientCertSubject>,
    ) -> String {
        subject.0
    }

    #[tokio::test]
    async fn forwards_subject_header_into_extensions() {
        let app = Router::new()
            .route("/", get(echo_subject))
            .layer(axum::middleware::from_fn(forwarded_client_cert_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(FORWARDED_CLIENT_CERT_SUBJECT_HEADER, "CN=Device-001,O=Acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}
