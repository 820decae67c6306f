use super::qualify::qualify_reference;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A named request/response transformer. Exactly one variant is set per
/// spec (spec §3 "MiddlewareSpec"); the router builder (C5) compiles
/// each instance into a handler closure.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum MiddlewareSpec {
    AddPrefix { prefix: String },
    StripPrefix { prefixes: Vec<String> },
    StripPrefixRegex { regex: Vec<String> },
    ReplacePath { path: String },
    ReplacePathRegex { regex: String, replacement: String },
    RedirectRegex {
        regex: String,
        replacement: String,
        #[serde(default)]
        permanent: bool,
    },
    RedirectScheme {
        scheme: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        permanent: bool,
    },
    BasicAuth(BasicAuth),
    DigestAuth(DigestAuth),
    ForwardAuth(ForwardAuth),
    Headers(Headers),
    RateLimit(RateLimit),
    InFlightReq(InFlightReq),
    InFlightConn(InFlightConn),
    IpAllowList(IpAllowList),
    Buffering(Buffering),
    Retry(Retry),
    CircuitBreaker(CircuitBreaker),
    Compress(Compress),
    Errors(ErrorPage),
    PassTlsClientCert(PassTlsClientCert),
    Chain { middlewares: Vec<String> },
    Plugin {
        name: String,
        #[serde(default)]
        config: IndexMap<String, String>,
    },
}

impl MiddlewareSpec {
    /// A short name for diagnostics/metrics labels, independent of the
    /// instance's configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            MiddlewareSpec::AddPrefix { .. } => "add-prefix",
            MiddlewareSpec::StripPrefix { .. } => "strip-prefix",
            MiddlewareSpec::StripPrefixRegex { .. } => "strip-prefix-regex",
            MiddlewareSpec::ReplacePath { .. } => "replace-path",
            MiddlewareSpec::ReplacePathRegex { .. } => "replace-path-regex",
            MiddlewareSpec::RedirectRegex { .. } => "redirect-regex",
            MiddlewareSpec::RedirectScheme { .. } => "redirect-scheme",
            MiddlewareSpec::BasicAuth(_) => "basic-auth",
            MiddlewareSpec::DigestAuth(_) => "digest-auth",
            MiddlewareSpec::ForwardAuth(_) => "forward-auth",
            MiddlewareSpec::Headers(_) => "headers",
            MiddlewareSpec::RateLimit(_) => "rate-limit",
            MiddlewareSpec::InFlightReq(_) => "in-flight-req",
            MiddlewareSpec::InFlightConn(_) => "in-flight-conn",
            MiddlewareSpec::IpAllowList(_) => "ip-allow-list",
            MiddlewareSpec::Buffering(_) => "buffering",
            MiddlewareSpec::Retry(_) => "retry",
            MiddlewareSpec::CircuitBreaker(_) => "circuit-breaker",
            MiddlewareSpec::Compress(_) => "compress",
            MiddlewareSpec::Errors(_) => "errors",
            MiddlewareSpec::PassTlsClientCert(_) => "pass-tls-client-cert",
            MiddlewareSpec::Chain { .. } => "chain",
            MiddlewareSpec::Plugin { .. } => "plugin",
        }
    }

    /// Qualifies embedded references to other named entities against
    /// `DEFAULT_SOURCE` (spec §9) — a `chain`'s member names and an
    /// `errors` middleware's error-page `service`. Every other variant
    /// carries no cross-reference and is cloned as-is.
    pub(super) fn qualified(&self) -> Self {
        match self {
            MiddlewareSpec::Chain { middlewares } => MiddlewareSpec::Chain {
                middlewares: middlewares.iter().map(|m| qualify_reference(m)).collect(),
            },
            MiddlewareSpec::Errors(spec) => MiddlewareSpec::Errors(ErrorPage {
                service: qualify_reference(&spec.service),
                ..spec.clone()
            }),
            other => other.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub users: Vec<String>,
    #[serde(default)]
    pub users_file: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub header_field: Option<String>,
    #[serde(default)]
    pub remove_header: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigestAuth {
    pub users: Vec<String>,
    #[serde(default)]
    pub users_file: Option<String>,
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default)]
    pub header_field: Option<String>,
    #[serde(default)]
    pub remove_header: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardAuth {
    pub address: String,
    #[serde(default)]
    pub tls: Option<ForwardAuthTls>,
    #[serde(default)]
    pub trust_forward_header: bool,
    #[serde(default)]
    pub auth_request_headers: Vec<String>,
    #[serde(default)]
    pub auth_response_headers: Vec<String>,
    #[serde(default)]
    pub forward_body: bool,
    #[serde(default)]
    pub preserve_request_method: bool,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: i64,
}

fn default_max_body_size() -> i64 {
    -1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardAuthTls {
    #[serde(default)]
    pub ca: Option<String>,
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Headers {
    #[serde(default)]
    pub custom_request_headers: IndexMap<String, String>,
    #[serde(default)]
    pub custom_response_headers: IndexMap<String, String>,
    #[serde(default)]
    pub access_control_allow_credentials: bool,
    #[serde(default)]
    pub access_control_allow_headers: Vec<String>,
    #[serde(default)]
    pub access_control_allow_methods: Vec<String>,
    #[serde(default)]
    pub access_control_allow_origin_list: Vec<String>,
    #[serde(default)]
    pub access_control_expose_headers: Vec<String>,
    #[serde(default)]
    pub access_control_max_age: i64,
    #[serde(default)]
    pub add_vary_header: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimit {
    pub average: u64,
    #[serde(default = "default_period", with = "crate::label::scalars::duration")]
    pub period: Duration,
    #[serde(default)]
    pub burst: u64,
    #[serde(default)]
    pub source_criterion: SourceCriterion,
}

fn default_period() -> Duration {
    Duration::from_secs(1)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceCriterion {
    #[serde(default)]
    pub ip_strategy: Option<IpStrategy>,
    #[serde(default)]
    pub request_header_name: Option<String>,
    #[serde(default)]
    pub request_host: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpStrategy {
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub excluded_ips: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InFlightReq {
    pub amount: u64,
    #[serde(default)]
    pub source_criterion: SourceCriterion,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InFlightConn {
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpAllowList {
    pub source_range: Vec<String>,
    #[serde(default)]
    pub ip_strategy: Option<IpStrategy>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Buffering {
    #[serde(default)]
    pub max_request_body_bytes: i64,
    #[serde(default)]
    pub mem_request_body_bytes: i64,
    #[serde(default)]
    pub max_response_body_bytes: i64,
    #[serde(default)]
    pub mem_response_body_bytes: i64,
    #[serde(default)]
    pub retry_expression: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Retry {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_interval", with = "crate::label::scalars::duration")]
    pub initial_interval: Duration,
    #[serde(default = "default_retry_timeout", with = "crate::label::scalars::duration")]
    pub timeout: Duration,
    #[serde(default = "default_max_body_bytes")]
    pub max_request_body_bytes: i64,
    #[serde(default)]
    pub retry_non_idempotent_method: bool,
    #[serde(default = "default_retry_status_codes")]
    pub status_codes: Vec<u16>,
    /// Whether a connection-level failure (dial/reset, before a response
    /// is ever classified by status code) counts as a retryable attempt.
    /// Spec §4.5: retries on network error "unless disabled".
    #[serde(default = "default_true")]
    pub retry_on_network_error: bool,
}

fn default_true() -> bool {
    true
}

fn default_attempts() -> u32 {
    1
}
fn default_retry_interval() -> Duration {
    Duration::from_millis(100)
}
fn default_retry_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_max_body_bytes() -> i64 {
    2 * 1024 * 1024
}
fn default_retry_status_codes() -> Vec<u16> {
    vec![502, 503, 504]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreaker {
    pub expression: String,
    #[serde(default = "default_check_period", with = "crate::label::scalars::duration")]
    pub check_period: Duration,
    #[serde(
        default = "default_fallback_duration",
        with = "crate::label::scalars::duration"
    )]
    pub fallback_duration: Duration,
    #[serde(
        default = "default_recovery_duration",
        with = "crate::label::scalars::duration"
    )]
    pub recovery_duration: Duration,
    #[serde(default = "default_response_code")]
    pub response_code: u16,
}

fn default_check_period() -> Duration {
    Duration::from_millis(100)
}
fn default_fallback_duration() -> Duration {
    Duration::from_secs(10)
}
fn default_recovery_duration() -> Duration {
    Duration::from_secs(10)
}
fn default_response_code() -> u16 {
    503
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Compress {
    #[serde(default = "default_min_response_body_bytes")]
    pub min_response_body_bytes: i64,
    #[serde(default)]
    pub excluded_content_types: Vec<String>,
}

fn default_min_response_body_bytes() -> i64 {
    1024
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorPage {
    pub status: Vec<String>,
    pub service: String,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassTlsClientCert {
    #[serde(default)]
    pub pem: bool,
    #[serde(default)]
    pub info: Option<PassTlsClientCertInfo>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PassTlsClientCertInfo {
    #[serde(default)]
    pub not_after: bool,
    #[serde(default)]
    pub not_before: bool,
    #[serde(default)]
    pub sans: bool,
    #[serde(default)]
    pub subject: bool,
    #[serde(default)]
    pub issuer: bool,
    #[serde(default)]
    pub serial_number: bool,
}
