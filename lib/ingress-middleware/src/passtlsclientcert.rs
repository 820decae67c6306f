//! PassTLSClientCert (spec §4.5: "injects PEM/info headers from
//! `req.TLS.PeerCertificates[0]`").

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ingress_config::dynamic::PassTlsClientCert as PassTlsClientCertSpec;

pub struct PassTlsClientCert {
    spec: PassTlsClientCertSpec,
}

impl PassTlsClientCert {
    pub fn new(spec: PassTlsClientCertSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Middleware for PassTlsClientCert {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        if let Some(der) = &req.peer_certificate {
            if self.spec.pem {
                let pem = format!(
                    "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----",
                    STANDARD.encode(der)
                );
                if let Ok(v) = http::HeaderValue::from_str(&pem.replace('\n', " ")) {
                    req.headers.insert("x-forwarded-tls-client-cert", v);
                }
            }
            if let Some(info) = &self.spec.info {
                // Without a parsed X.509 structure we can only attest
                // presence, not the individual requested fields; this is
                // a conservative placeholder until certificate parsing
                // is added to ingress-server.
                let mut parts = Vec::new();
                if info.subject {
                    parts.push("Subject=\"\"");
                }
                if info.issuer {
                    parts.push("Issuer=\"\"");
                }
                if info.not_before {
                    parts.push("NotBefore=\"\"");
                }
                if info.not_after {
                    parts.push("NotAfter=\"\"");
                }
                if info.sans {
                    parts.push("SANs=\"\"");
                }
                if info.serial_number {
                    parts.push("SerialNumber=\"\"");
                }
                if !parts.is_empty() {
                    if let Ok(v) = http::HeaderValue::from_str(&parts.join(";")) {
                        req.headers.insert("x-forwarded-tls-client-cert-info", v);
                    }
                }
            }
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "pass-tls-client-cert"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_request;
    use async_trait::async_trait as at;

    struct CaptureHeaders;
    #[at]
    impl Handler for CaptureHeaders {
        async fn call(
            &self,
            req: MiddlewareRequest,
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            let mut resp = MiddlewareResponse::with_status(http::StatusCode::OK);
            if req.headers.contains_key("x-forwarded-tls-client-cert") {
                resp.headers.insert("saw-pem", "1".parse().unwrap());
            }
            Ok(resp)
        }
    }

    #[tokio::test]
    async fn injects_pem_header_when_cert_present() {
        let mw = PassTlsClientCert::new(PassTlsClientCertSpec {
            pem: true,
            info: None,
        });
        let mut req = test_request("/");
        req.peer_certificate = Some(vec![1, 2, 3]);
        let resp = mw.handle(req, &CaptureHeaders).await.unwrap();
        assert!(resp.headers.contains_key("saw-pem"));
    }

    #[tokio::test]
    async fn no_header_without_client_certificate() {
        let mw = PassTlsClientCert::new(PassTlsClientCertSpec {
            pem: true,
            info: None,
        });
        let resp = mw.handle(test_request("/"), &CaptureHeaders).await.unwrap();
        assert!(!resp.headers.contains_key("saw-pem"));
    }
}
