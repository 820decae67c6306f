//! Loads a `rustls::ServerConfig` from the dynamic TLS configuration
//! (spec §4.8 "terminate using the selected certificate and options").
//!
//! `CertificateEntry` carries no parsed domain metadata (no SAN list),
//! matching `ingress_router::tls`'s own documented stance that exact
//! domain-to-certificate matching is deferred to the handshake itself.
//! Lacking an X.509 parser in the dependency stack, termination here
//! uses the first configured certificate as a single default `SniResolver`
//! would otherwise negotiate; multi-certificate SNI selection is left as
//! a follow-up (see DESIGN.md).

use ingress_config::dynamic::{Certificate, TlsConfiguration};
use std::io::BufReader;
use std::sync::Arc;

pub fn load_server_config(tls: &TlsConfiguration) -> Option<Arc<rustls::ServerConfig>> {
    let entry = tls.certificates.first()?;
    let (cert_chain, key) = load_certificate(&entry.certificate)?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|err| tracing::warn!(%err, "invalid TLS certificate, refusing to terminate"))
        .ok()?;

    Some(Arc::new(config))
}

fn load_certificate(
    certificate: &Certificate,
) -> Option<(Vec<rustls::Certificate>, rustls::PrivateKey)> {
    match certificate {
        Certificate::Inline { cert, key } => Some((parse_certs(cert)?, parse_key(key)?)),
        Certificate::CertFile { cert_file, key_file } => {
            let cert_bytes = std::fs::read(cert_file)
                .map_err(|err| tracing::warn!(%err, file = %cert_file, "failed to read cert file"))
                .ok()?;
            let key_bytes = std::fs::read(key_file)
                .map_err(|err| tracing::warn!(%err, file = %key_file, "failed to read key file"))
                .ok()?;
            Some((parse_certs(&cert_bytes)?, parse_key(&key_bytes)?))
        }
    }
}

fn parse_certs(pem: &[u8]) -> Option<Vec<rustls::Certificate>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem)).ok()?;
    if certs.is_empty() {
        return None;
    }
    Some(certs.into_iter().map(rustls::Certificate).collect())
}

fn parse_key(pem: &[u8]) -> Option<rustls::PrivateKey> {
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(pem)).ok()?;
    if keys.is_empty() {
        keys = rustls_pemfile::rsa_private_keys(&mut BufReader::new(pem)).ok()?;
    }
    keys.into_iter().next().map(rustls::PrivateKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_certificates_configured_yields_none() {
        let tls = TlsConfiguration::default();
        assert!(load_server_config(&tls).is_none());
    }

    #[test]
    fn malformed_inline_pem_yields_none() {
        assert!(parse_certs(b"not a pem file").is_none());
        assert!(parse_key(b"not a pem file").is_none());
    }
}
