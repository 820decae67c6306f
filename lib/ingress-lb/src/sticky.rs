//! Sticky session cookie encode/decode (spec §4.6: "write a sticky
//! cookie on the response containing an opaque server ID").

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// The opaque server ID is simply the base64 of the server URL: stable
/// across process restarts as long as the endpoint list doesn't change,
/// and self-describing enough to avoid an extra lookup table.
pub fn encode_id(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url)
}

pub fn decode_id(id: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(id)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Extracts a named cookie's value from a raw `Cookie` header.
pub fn read_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|kv| {
        let (k, v) = kv.trim().split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

pub fn set_cookie_header(name: &str, id: &str, secure: bool, http_only: bool) -> String {
    let mut header = format!("{name}={id}; Path=/");
    if secure {
        header.push_str("; Secure");
    }
    if http_only {
        header.push_str("; HttpOnly");
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_server_id() {
        let id = encode_id("http://10.0.0.1:8080");
        assert_eq!(decode_id(&id).unwrap(), "http://10.0.0.1:8080");
    }

    #[test]
    fn reads_named_cookie_from_header() {
        let header = "other=1; sticky=abc123; another=x";
        assert_eq!(read_cookie(header, "sticky"), Some("abc123".to_string()));
        assert_eq!(read_cookie(header, "missing"), None);
    }
}
