use thiserror::Error;

/// A label (or label-derived JSON document) could not be decoded into the
/// requested type, per spec §4.1: "Fails with `MalformedLabel` ... on
/// unparseable scalar values, conflicting types at a path, or unknown
/// root prefixes".
#[derive(Debug, Error)]
#[error("malformed label at `{path}`: {reason}")]
pub struct MalformedLabel {
    pub path: String,
    pub reason: String,
}

impl MalformedLabel {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
