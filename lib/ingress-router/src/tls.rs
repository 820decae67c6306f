//! TLS resolution (spec §4.4 step 6): best-effort check that a
//! certificate is already available (or a resolver can provision one)
//! for a router's requested SNI domains. This never fails the build:
//! a miss is only a warning, since the certificate may appear later
//! (e.g. ACME-style provisioning via a `Store`'s `defaultGeneratedCert`).

use ingress_config::dynamic::TlsConfiguration;

/// Returns `true` if `domain` is already covered by a concrete
/// certificate, or by a store configured to generate one on demand.
pub fn domain_is_covered(tls: &TlsConfiguration, domain: &str) -> bool {
    if !tls.certificates.is_empty() {
        // At least one certificate is loaded; without parsing X.509 SANs
        // we can't confirm it covers this exact domain, so we treat any
        // configured certificate as provisional coverage and let the
        // dispatcher's TLS handshake be the final authority.
        return true;
    }
    tls.stores.values().any(|store| {
        store
            .default_generated_cert
            .as_ref()
            .map(|cert| host_covers(&cert.domain_main, domain) || cert.domain_sans.iter().any(|s| host_covers(s, domain)))
            .unwrap_or(false)
    })
}

fn host_covers(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host
            .split_once('.')
            .map(|(_, rest)| rest.eq_ignore_ascii_case(suffix))
            .unwrap_or(false);
    }
    pattern.eq_ignore_ascii_case(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::{GeneratedCert, Store};

    #[test]
    fn uncovered_domain_with_no_certs_or_stores() {
        let tls = TlsConfiguration::default();
        assert!(!domain_is_covered(&tls, "example.com"));
    }

    #[test]
    fn generated_cert_store_covers_wildcard_domain() {
        let mut tls = TlsConfiguration::default();
        tls.stores.insert(
            "default".to_string(),
            Store {
                default_generated_cert: Some(GeneratedCert {
                    resolver: "letsencrypt".to_string(),
                    domain_main: "*.example.com".to_string(),
                    domain_sans: vec![],
                }),
                default_certificate: None,
            },
        );
        assert!(domain_is_covered(&tls, "foo.example.com"));
    }
}
