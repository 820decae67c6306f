//! Tree-shape evaluation of a compiled [`Rule`] against a [`MatchContext`]
//! (spec §4.4 step 2: "compile to a matcher with tree-shape evaluation").

use crate::ast::Rule;
use crate::context::MatchContext;

pub fn matches(rule: &Rule, ctx: &MatchContext<'_>) -> bool {
    match rule {
        Rule::Host(hosts) => hosts.iter().any(|h| host_matches(h, ctx.host)),
        Rule::HostRegexp(re) => re.is_match(ctx.host),
        Rule::Path(paths) => paths.iter().any(|p| p == ctx.path),
        Rule::PathPrefix(prefixes) => prefixes.iter().any(|p| ctx.path.starts_with(p.as_str())),
        Rule::PathRegexp(re) => re.is_match(ctx.path),
        Rule::Method(methods) => methods.iter().any(|m| m.eq_ignore_ascii_case(ctx.method.as_str())),
        Rule::Headers(name, value) => ctx
            .headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v == value)
            .unwrap_or(false),
        Rule::HeaderRegexp(name, re) => ctx
            .headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| re.is_match(v))
            .unwrap_or(false),
        Rule::Query(name, expected) => query_matches(ctx.query, name, expected.as_deref()),
        Rule::ClientIp(nets) => nets.iter().any(|n| n.contains(&ctx.client_ip)),
        Rule::And(l, r) => matches(l, ctx) && matches(r, ctx),
        Rule::Or(l, r) => matches(l, ctx) || matches(r, ctx),
        Rule::Not(r) => !matches(r, ctx),
    }
}

fn host_matches(pattern: &str, host: &str) -> bool {
    // A leading `*.` wildcard matches exactly one label, mirroring how
    // TLS SNI wildcard certs are commonly matched.
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return host
            .split_once('.')
            .map(|(_, rest)| rest.eq_ignore_ascii_case(suffix))
            .unwrap_or(false);
    }
    pattern.eq_ignore_ascii_case(host)
}

fn query_matches(raw_query: &str, name: &str, expected: Option<&str>) -> bool {
    for pair in raw_query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        if key != name {
            continue;
        }
        return match expected {
            None => true,
            Some(expected) => parts.next().unwrap_or("") == expected,
        };
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use http::{HeaderMap, Method};
    use std::net::IpAddr;

    fn ctx<'a>(host: &'a str, path: &'a str, headers: &'a HeaderMap, query: &'a str) -> MatchContext<'a> {
        MatchContext {
            host,
            path,
            method: &Method::GET,
            headers,
            query,
            client_ip: "10.0.0.5".parse::<IpAddr>().unwrap(),
        }
    }

    #[test]
    fn host_and_path_prefix_combinator() {
        let rule = parse("Host(`a.com`) && PathPrefix(`/api`)").unwrap();
        let headers = HeaderMap::new();
        assert!(matches(&rule, &ctx("a.com", "/api/v1", &headers, "")));
        assert!(!matches(&rule, &ctx("a.com", "/other", &headers, "")));
        assert!(!matches(&rule, &ctx("b.com", "/api/v1", &headers, "")));
    }

    #[test]
    fn wildcard_host_matches_one_label() {
        let rule = parse("Host(`*.example.com`)").unwrap();
        let headers = HeaderMap::new();
        assert!(matches(&rule, &ctx("foo.example.com", "/", &headers, "")));
        assert!(!matches(&rule, &ctx("foo.bar.example.com", "/", &headers, "")));
    }

    #[test]
    fn client_ip_cidr_matches() {
        let rule = parse("ClientIP(`10.0.0.0/8`)").unwrap();
        let headers = HeaderMap::new();
        assert!(matches(&rule, &ctx("a.com", "/", &headers, "")));
    }

    #[test]
    fn negation_inverts_result() {
        let rule = parse("!Path(`/admin`)").unwrap();
        let headers = HeaderMap::new();
        assert!(matches(&rule, &ctx("a.com", "/", &headers, "")));
        assert!(!matches(&rule, &ctx("a.com", "/admin", &headers, "")));
    }
}
