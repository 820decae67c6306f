//! Decodes and encodes the flat `label -> string` maps providers such as
//! the Docker/Kubernetes adapters surface into the typed `dynamic`
//! configuration model, per spec §4.1 and grounded on
//! `original_source/pkg/config/label/label.go`'s `DecodeConfiguration`.

pub mod error;
pub mod scalars;
pub mod tree;

pub use error::MalformedLabel;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Decodes `labels` (filtered to those under `root_prefix`) into `T`.
///
/// Fails when a key path references a field not present in `T`'s schema,
/// or when a scalar can't be parsed into its target type (spec §4.1).
/// Only unknown *top-level prefixes* — labels that don't start with
/// `root_prefix` at all — are silently ignored; every struct reachable
/// from `T` carries `#[serde(deny_unknown_fields)]` so a typo inside a
/// known section is caught here rather than silently dropped.
pub fn decode_configuration<T: DeserializeOwned>(
    labels: &IndexMap<String, String>,
    root_prefix: &str,
) -> Result<T, MalformedLabel> {
    let node = tree::build(labels, root_prefix);
    let value = node.to_json();
    serde_json::from_value(value)
        .map_err(|e| MalformedLabel::new(root_prefix, e.to_string()))
}

/// Encodes `value` back into a flat label map under `root_prefix`, the
/// inverse of [`decode_configuration`]. Used to satisfy the round-trip
/// law `decode(encode(x)) == x` (spec §7).
pub fn encode_configuration<T: Serialize>(
    value: &T,
    root_prefix: &str,
) -> Result<IndexMap<String, String>, MalformedLabel> {
    let json = serde_json::to_value(value)
        .map_err(|e| MalformedLabel::new(root_prefix, e.to_string()))?;
    let node = tree::LabelNode::from_json(&json);
    let mut flat = IndexMap::new();
    node.flatten(root_prefix, &mut flat);
    Ok(flat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::HttpConfiguration;

    fn labels(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Scenario S1 (spec §8): a single router+service decoded from
    /// labels produces the expected typed tree.
    #[test]
    fn decodes_single_router_and_service() {
        let labels = labels(&[
            ("ingress.http.routers.web.rule", "Host(`a`)"),
            ("ingress.http.routers.web.service", "svc"),
            ("ingress.http.services.svc.loadBalancer.servers[0].url", "http://127.0.0.1:80"),
        ]);
        let http: HttpConfiguration = decode_configuration(&labels, "ingress.http").unwrap();
        assert_eq!(http.routers["web"].rule, "Host(`a`)");
        assert_eq!(http.routers["web"].service, "svc");
        let crate::dynamic::HttpService::LoadBalancer(lb) = &http.services["svc"] else {
            panic!("expected loadBalancer service");
        };
        assert_eq!(lb.servers[0].url, "http://127.0.0.1:80");
    }

    #[test]
    fn malformed_scalar_reports_malformed_label() {
        let labels = labels(&[
            ("ingress.http.routers.web.rule", "Host(`a`)"),
            ("ingress.http.routers.web.service", "svc"),
            ("ingress.http.routers.web.priority", "not-a-number"),
        ]);
        let result: Result<HttpConfiguration, _> = decode_configuration(&labels, "ingress.http");
        assert!(result.is_err());
    }

    #[test]
    fn round_trips_through_encode_and_decode() {
        let labels = labels(&[
            ("ingress.http.routers.web.rule", "Host(`a`)"),
            ("ingress.http.routers.web.service", "svc"),
            ("ingress.http.services.svc.loadBalancer.servers[0].url", "http://127.0.0.1:80"),
        ]);
        let http: HttpConfiguration = decode_configuration(&labels, "ingress.http").unwrap();
        let re_encoded = encode_configuration(&http, "ingress.http").unwrap();
        let http_again: HttpConfiguration =
            decode_configuration(&re_encoded, "ingress.http").unwrap();
        assert_eq!(http.routers["web"].rule, http_again.routers["web"].rule);
        assert_eq!(http.routers["web"].service, http_again.routers["web"].service);
    }
}
