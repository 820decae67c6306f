//! BasicAuth / DigestAuth / ForwardAuth (spec §4.5).

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ingress_config::dynamic::{BasicAuth as BasicAuthSpec, DigestAuth as DigestAuthSpec, ForwardAuth as ForwardAuthSpec};
use md5::{Digest as _, Md5};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

fn parse_htpasswd_style(users: &[String]) -> HashMap<String, String> {
    users
        .iter()
        .filter_map(|entry| entry.split_once(':'))
        .map(|(user, secret)| (user.to_string(), secret.to_string()))
        .collect()
}

pub struct BasicAuth {
    credentials: HashMap<String, String>,
    realm: String,
    header_field: Option<String>,
    remove_header: bool,
}

impl BasicAuth {
    pub fn new(spec: BasicAuthSpec) -> Self {
        Self {
            credentials: parse_htpasswd_style(&spec.users),
            realm: spec.realm.unwrap_or_else(|| "ingress".to_string()),
            header_field: spec.header_field,
            remove_header: spec.remove_header,
        }
    }

    fn check(&self, value: &str) -> Option<String> {
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, pass) = text.split_once(':')?;
        if self.credentials.get(user).map(|s| s.as_str()) == Some(pass) {
            Some(user.to_string())
        } else {
            None
        }
    }
}

#[async_trait]
impl Middleware for BasicAuth {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let user = req
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| self.check(v));

        let Some(user) = user else {
            let mut resp = MiddlewareResponse::with_status(http::StatusCode::UNAUTHORIZED);
            resp.headers.insert(
                http::header::WWW_AUTHENTICATE,
                http::HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm))
                    .unwrap_or(http::HeaderValue::from_static("Basic")),
            );
            return Ok(resp);
        };

        if self.remove_header {
            req.headers.remove(http::header::AUTHORIZATION);
        }
        let field = self.header_field.as_deref().unwrap_or("x-forwarded-user");
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(field.as_bytes()),
            http::HeaderValue::from_str(&user),
        ) {
            req.headers.insert(name, value);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "basic-auth"
    }
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// `users` entries are `user:realm:ha1` (the `htdigest` file format, HA1
/// already being `MD5(user:realm:password)`) or, for convenience, plain
/// `user:password` — in which case HA1 is derived against this auth's own
/// `realm` at load time so operators don't have to pre-hash by hand.
fn parse_htdigest_style(users: &[String], realm: &str) -> HashMap<(String, String), String> {
    users
        .iter()
        .filter_map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let user = parts.next()?.to_string();
            let second = parts.next()?.to_string();
            match parts.next() {
                Some(ha1) => Some(((user, second), ha1.to_string())),
                None => {
                    let ha1 = md5_hex(&format!("{user}:{realm}:{second}"));
                    Some(((user, realm.to_string()), ha1))
                }
            }
        })
        .collect()
}

/// Splits `Authorization: Digest ...` parameters on commas, ignoring
/// commas inside quoted values (the `uri` parameter is a query string and
/// routinely contains them).
fn split_digest_params(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(s[start..].trim());
    out
}

fn parse_digest_header(value: &str) -> Option<HashMap<String, String>> {
    let rest = value.strip_prefix("Digest ")?;
    let mut map = HashMap::new();
    for part in split_digest_params(rest) {
        let (key, val) = part.split_once('=')?;
        map.insert(key.trim().to_string(), val.trim().trim_matches('"').to_string());
    }
    Some(map)
}

/// RFC 2617 digest access authentication. Verifies the client's computed
/// `response` against HA1/HA2 derived from the configured user table
/// rather than delegating to [`BasicAuth`] — a `Digest` challenge demands
/// a real challenge/response check, not a Basic-scheme credential compare.
pub struct DigestAuth {
    credentials: HashMap<(String, String), String>,
    realm: String,
    header_field: Option<String>,
    remove_header: bool,
    nonce_rng: Mutex<SmallRng>,
}

impl DigestAuth {
    pub fn new(spec: DigestAuthSpec) -> Self {
        let realm = spec.realm.unwrap_or_else(|| "ingress".to_string());
        Self {
            credentials: parse_htdigest_style(&spec.users, &realm),
            realm,
            header_field: spec.header_field,
            remove_header: spec.remove_header,
            nonce_rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    fn fresh_nonce(&self) -> String {
        let mut rng = self.nonce_rng.lock().unwrap();
        let bytes: [u8; 16] = rng.gen();
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn challenge(&self) -> MiddlewareResponse {
        let mut resp = MiddlewareResponse::with_status(http::StatusCode::UNAUTHORIZED);
        let challenge = format!(
            "Digest realm=\"{}\", qop=\"auth\", nonce=\"{}\"",
            self.realm,
            self.fresh_nonce()
        );
        resp.headers.insert(
            http::header::WWW_AUTHENTICATE,
            http::HeaderValue::from_str(&challenge).unwrap_or(http::HeaderValue::from_static("Digest")),
        );
        resp
    }

    /// Verifies `value` (the raw `Authorization` header) against `method`
    /// and returns the authenticated username on success.
    fn check(&self, value: &str, method: &http::Method) -> Option<String> {
        let params = parse_digest_header(value)?;
        let username = params.get("username")?;
        let realm = params.get("realm")?;
        let nonce = params.get("nonce")?;
        let uri = params.get("uri")?;
        let response = params.get("response")?;

        let ha1 = self.credentials.get(&(username.clone(), realm.clone()))?;
        let ha2 = md5_hex(&format!("{}:{}", method.as_str(), uri));

        let expected = match (params.get("qop").map(String::as_str), params.get("nc"), params.get("cnonce")) {
            (Some(qop @ ("auth" | "auth-int")), Some(nc), Some(cnonce)) => {
                md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"))
            }
            _ => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
        };

        if expected.eq_ignore_ascii_case(response) {
            Some(username.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl Middleware for DigestAuth {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let user = req
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| self.check(v, &req.method));

        let Some(user) = user else {
            return Ok(self.challenge());
        };

        if self.remove_header {
            req.headers.remove(http::header::AUTHORIZATION);
        }
        let field = self.header_field.as_deref().unwrap_or("x-forwarded-user");
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(field.as_bytes()),
            http::HeaderValue::from_str(&user),
        ) {
            req.headers.insert(name, value);
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "digest-auth"
    }
}

/// Synchronous sub-request to an external authorization service (spec
/// §4.5: "on 2xx, copies authorized response headers to the upstream
/// request, then proceeds; on non-2xx, relays that response").
#[async_trait]
pub trait ForwardAuthClient: Send + Sync {
    async fn authorize(
        &self,
        address: &str,
        req: &MiddlewareRequest,
        forward_headers: &[String],
    ) -> Result<MiddlewareResponse, MiddlewareError>;
}

pub struct ForwardAuth {
    spec: ForwardAuthSpec,
    client: Arc<dyn ForwardAuthClient>,
}

impl ForwardAuth {
    pub fn new(spec: ForwardAuthSpec, client: Arc<dyn ForwardAuthClient>) -> Self {
        Self { spec, client }
    }
}

#[async_trait]
impl Middleware for ForwardAuth {
    async fn handle(
        &self,
        mut req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let auth_resp = self
            .client
            .authorize(&self.spec.address, &req, &self.spec.auth_request_headers)
            .await?;

        if !auth_resp.status.is_success() {
            return Err(MiddlewareError::ForwardAuthDenied {
                status: auth_resp.status,
            });
        }

        for name in &self.spec.auth_response_headers {
            if let Ok(header_name) = http::HeaderName::from_bytes(name.as_bytes()) {
                if let Some(value) = auth_resp.headers.get(&header_name) {
                    req.headers.insert(header_name, value.clone());
                }
            }
        }
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "forward-auth"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_request, AlwaysOk, NeverCalled};
    use async_trait::async_trait as at;

    #[tokio::test]
    async fn rejects_missing_credentials() {
        let mw = BasicAuth::new(BasicAuthSpec {
            users: vec!["alice:secret".to_string()],
            users_file: None,
            realm: None,
            header_field: None,
            remove_header: false,
        });
        let resp = mw.handle(test_request("/"), &NeverCalled).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn accepts_valid_credentials() {
        let mw = BasicAuth::new(BasicAuthSpec {
            users: vec!["alice:secret".to_string()],
            users_file: None,
            realm: None,
            header_field: None,
            remove_header: false,
        });
        let mut req = test_request("/");
        let encoded = STANDARD.encode("alice:secret");
        req.headers.insert(
            http::header::AUTHORIZATION,
            format!("Basic {encoded}").parse().unwrap(),
        );
        let resp = mw.handle(req, &AlwaysOk).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::OK);
    }

    #[tokio::test]
    async fn digest_auth_rejects_missing_credentials() {
        let mw = DigestAuth::new(DigestAuthSpec {
            users: vec!["alice:secret".to_string()],
            users_file: None,
            realm: None,
            header_field: None,
            remove_header: false,
        });
        let resp = mw.handle(test_request("/"), &NeverCalled).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::UNAUTHORIZED);
        assert!(resp
            .headers
            .get(http::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .starts_with("Digest"));
    }

    #[tokio::test]
    async fn digest_auth_accepts_a_correctly_computed_response() {
        let mw = DigestAuth::new(DigestAuthSpec {
            users: vec!["alice:secret".to_string()],
            users_file: None,
            realm: Some("ingress".to_string()),
            header_field: None,
            remove_header: false,
        });

        let realm = "ingress";
        let nonce = "abc123";
        let uri = "/";
        let nc = "00000001";
        let cnonce = "clientnonce";
        let qop = "auth";
        let ha1 = md5_hex(&format!("alice:{realm}:secret"));
        let ha2 = md5_hex(&format!("GET:{uri}"));
        let response = md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}"));

        let mut req = test_request("/");
        let header = format!(
            "Digest username=\"alice\", realm=\"{realm}\", nonce=\"{nonce}\", uri=\"{uri}\", \
             qop={qop}, nc={nc}, cnonce=\"{cnonce}\", response=\"{response}\""
        );
        req.headers
            .insert(http::header::AUTHORIZATION, header.parse().unwrap());

        let resp = mw.handle(req, &AlwaysOk).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::OK);
    }

    #[tokio::test]
    async fn digest_auth_rejects_a_response_computed_with_the_wrong_password() {
        let mw = DigestAuth::new(DigestAuthSpec {
            users: vec!["alice:secret".to_string()],
            users_file: None,
            realm: Some("ingress".to_string()),
            header_field: None,
            remove_header: false,
        });

        let ha1 = md5_hex("alice:ingress:wrong-password");
        let ha2 = md5_hex("GET:/");
        let response = md5_hex(&format!("{ha1}:abc123:{ha2}"));

        let mut req = test_request("/");
        let header =
            format!("Digest username=\"alice\", realm=\"ingress\", nonce=\"abc123\", uri=\"/\", response=\"{response}\"");
        req.headers
            .insert(http::header::AUTHORIZATION, header.parse().unwrap());

        let resp = mw.handle(req, &NeverCalled).await.unwrap();
        assert_eq!(resp.status, http::StatusCode::UNAUTHORIZED);
    }

    struct DenyAuth;
    #[at]
    impl ForwardAuthClient for DenyAuth {
        async fn authorize(
            &self,
            _address: &str,
            _req: &MiddlewareRequest,
            _forward_headers: &[String],
        ) -> Result<MiddlewareResponse, MiddlewareError> {
            Ok(MiddlewareResponse::with_status(http::StatusCode::FORBIDDEN))
        }
    }

    #[tokio::test]
    async fn forward_auth_relays_denial() {
        let mw = ForwardAuth::new(
            ForwardAuthSpec {
                address: "http://auth.internal".to_string(),
                tls: None,
                trust_forward_header: false,
                auth_request_headers: vec![],
                auth_response_headers: vec![],
                forward_body: false,
                preserve_request_method: false,
                max_body_size: -1,
            },
            Arc::new(DenyAuth),
        );
        let result = mw.handle(test_request("/"), &NeverCalled).await;
        assert!(matches!(
            result,
            Err(MiddlewareError::ForwardAuthDenied { status }) if status == http::StatusCode::FORBIDDEN
        ));
    }
}
