//! Name qualification (spec §3, §9): every name is namespaced by its
//! source provider as `name@source` on ingress into the aggregator, so
//! that two providers can never collide by construction. The qualifier
//! is stripped only for display.

use super::NamedMap;

/// The provider whose unqualified references resolve by default, absent
/// an explicit `@source` in a cross-reference. Resolved as an open
/// question in DESIGN.md: no implicit preference order across providers,
/// just this one fixed default.
pub const DEFAULT_SOURCE: &str = "file";

/// Qualifies a *defining* name (a router/service/middleware's own map
/// key) with `source`, unless it is already qualified. Used only for the
/// entity's own identity, never for a cross-reference to another entity
/// — see [`qualify_reference`] for that.
pub fn qualify(name: &str, source: &str) -> String {
    if name.contains('@') {
        name.to_string()
    } else {
        format!("{name}@{source}")
    }
}

/// Qualifies a *reference* (a router's `service`, a chain's middleware
/// names, a weighted child, ...) found inside a snapshot. An unqualified
/// reference always resolves against [`DEFAULT_SOURCE`], never against
/// the referencing entity's own provider (spec §9: "unqualified lookups
/// downstream resolve to `@<default-provider>`") — a router authored by
/// a non-file provider can still point at a plain `file`-provided
/// service by leaving the reference unqualified.
pub fn qualify_reference(name: &str) -> String {
    if name.contains('@') {
        name.to_string()
    } else {
        format!("{name}@{DEFAULT_SOURCE}")
    }
}

/// Splits a possibly-qualified name into its base name and source. A
/// name with no `@` is treated as referencing [`DEFAULT_SOURCE`], per
/// spec §9's "unqualified lookups downstream resolve to `@<default-provider>`".
pub fn split_qualifier(name: &str) -> (&str, &str) {
    match name.split_once('@') {
        Some((base, source)) => (base, source),
        None => (name, DEFAULT_SOURCE),
    }
}

/// Strips the qualifier for display purposes (spec §3: "the qualifier is
/// stripped only for display").
pub fn display_name(name: &str) -> &str {
    split_qualifier(name).0
}

/// Looks `name` up in `map`, falling back to its `@<source>`-qualified
/// form when the literal lookup misses. Lets callers that receive a
/// reference pre-`DEFAULT_SOURCE`-qualification (direct snapshot
/// construction in tests, or a same-provider reference that was never
/// routed through [`qualify_reference`]) still resolve against a table
/// whose keys are fully qualified.
pub fn lookup<'a, V>(map: &'a NamedMap<V>, name: &str) -> Option<(&'a str, &'a V)> {
    if let Some(value) = map.get(name) {
        return Some((name, value));
    }
    let (base, source) = split_qualifier(name);
    let qualified = format!("{base}@{source}");
    map.get_key_value(&qualified).map(|(k, v)| (k.as_str(), v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifies_bare_names() {
        assert_eq!(qualify("web", "file"), "web@file");
    }

    #[test]
    fn leaves_qualified_names_untouched() {
        assert_eq!(qualify("web@kv", "file"), "web@kv");
    }

    #[test]
    fn unqualified_reference_resolves_to_default_source() {
        assert_eq!(split_qualifier("web"), ("web", DEFAULT_SOURCE));
        assert_eq!(split_qualifier("web@kv"), ("web", "kv"));
    }

    #[test]
    fn display_name_strips_qualifier() {
        assert_eq!(display_name("web@kv"), "web");
        assert_eq!(display_name("web"), "web");
    }

    #[test]
    fn qualify_reference_always_targets_default_source_not_the_caller() {
        // A router authored by a non-"file" provider that leaves a
        // cross-reference unqualified must still resolve against
        // DEFAULT_SOURCE, not against its own provider (spec §9).
        assert_eq!(qualify_reference("svc"), format!("svc@{DEFAULT_SOURCE}"));
        assert_ne!(qualify_reference("svc"), qualify("svc", "kv"));
    }

    #[test]
    fn qualify_reference_leaves_already_qualified_names_untouched() {
        assert_eq!(qualify_reference("svc@kv"), "svc@kv");
    }

    #[test]
    fn lookup_falls_back_to_default_source_when_qualifier_is_missing() {
        let mut map: NamedMap<i32> = NamedMap::new();
        map.insert(format!("svc@{DEFAULT_SOURCE}"), 1);

        let (key, value) = lookup(&map, "svc").expect("expected fallback match");
        assert_eq!(key, format!("svc@{DEFAULT_SOURCE}"));
        assert_eq!(*value, 1);
    }

    #[test]
    fn lookup_prefers_an_exact_match_over_the_default_source_fallback() {
        let mut map: NamedMap<i32> = NamedMap::new();
        map.insert("svc@kv".to_string(), 1);
        map.insert(format!("svc@{DEFAULT_SOURCE}"), 2);

        let (key, value) = lookup(&map, "svc@kv").unwrap();
        assert_eq!(key, "svc@kv");
        assert_eq!(*value, 1);
    }

    #[test]
    fn lookup_returns_none_when_neither_form_is_present() {
        let map: NamedMap<i32> = NamedMap::new();
        assert!(lookup(&map, "svc").is_none());
    }
}
