//! Middleware pipeline resolution (spec §4.4 step 4): splices `chain`
//! middlewares in place and detects cycles.

use ingress_config::dynamic::{lookup, MiddlewareSpec, NamedMap};
use indexmap::IndexSet;

#[derive(Debug)]
pub enum MiddlewareResolveError {
    Missing(String),
    Cycle(String),
}

/// Expands `names` into the final, declared-order list of leaf (non-
/// `chain`) middleware names a router's pipeline is built from.
pub fn resolve_chain(
    names: &[String],
    middlewares: &NamedMap<MiddlewareSpec>,
) -> Result<Vec<String>, MiddlewareResolveError> {
    let mut resolved = Vec::new();
    let mut stack = IndexSet::new();
    for name in names {
        expand(name, middlewares, &mut stack, &mut resolved)?;
    }
    Ok(resolved)
}

fn expand(
    name: &str,
    middlewares: &NamedMap<MiddlewareSpec>,
    stack: &mut IndexSet<String>,
    out: &mut Vec<String>,
) -> Result<(), MiddlewareResolveError> {
    let (key, spec) =
        lookup(middlewares, name).ok_or_else(|| MiddlewareResolveError::Missing(name.to_string()))?;
    let key = key.to_string();
    match spec {
        MiddlewareSpec::Chain { middlewares: children } => {
            if !stack.insert(key.clone()) {
                return Err(MiddlewareResolveError::Cycle(key));
            }
            for child in children {
                expand(child, middlewares, stack, out)?;
            }
            stack.shift_remove(&key);
            Ok(())
        }
        _ => {
            out.push(key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_config::dynamic::Headers;

    fn headers_mw() -> MiddlewareSpec {
        MiddlewareSpec::Headers(Headers::default())
    }

    #[test]
    fn flattens_a_chain_in_declared_order() {
        let mut mws = NamedMap::new();
        mws.insert("auth".to_string(), headers_mw());
        mws.insert("strip".to_string(), headers_mw());
        mws.insert(
            "combo".to_string(),
            MiddlewareSpec::Chain {
                middlewares: vec!["auth".to_string(), "strip".to_string()],
            },
        );
        let resolved = resolve_chain(&["combo".to_string()], &mws).unwrap();
        assert_eq!(resolved, vec!["auth".to_string(), "strip".to_string()]);
    }

    #[test]
    fn detects_a_chain_cycle() {
        let mut mws = NamedMap::new();
        mws.insert(
            "a".to_string(),
            MiddlewareSpec::Chain {
                middlewares: vec!["b".to_string()],
            },
        );
        mws.insert(
            "b".to_string(),
            MiddlewareSpec::Chain {
                middlewares: vec!["a".to_string()],
            },
        );
        assert!(matches!(
            resolve_chain(&["a".to_string()], &mws),
            Err(MiddlewareResolveError::Cycle(_))
        ));
    }

    #[test]
    fn reports_missing_middleware() {
        let mws: NamedMap<MiddlewareSpec> = NamedMap::new();
        assert!(matches!(
            resolve_chain(&["nope".to_string()], &mws),
            Err(MiddlewareResolveError::Missing(_))
        ));
    }
}
