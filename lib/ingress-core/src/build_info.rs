//! Process-global, read-only build metadata.
//!
//! Mirrors the teacher's single intentional piece of mutable global state
//! (a version/codename/start-date singleton set once at startup and read
//! by the dashboard API thereafter, never touched by the dispatch path).

use std::sync::OnceLock;
use std::time::SystemTime;

#[derive(Clone, Debug, serde::Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub codename: String,
    #[serde(with = "start_date")]
    pub start_date: SystemTime,
}

static BUILD_INFO: OnceLock<BuildInfo> = OnceLock::new();

/// Initializes the build-info singleton. Idempotent: later calls are
/// ignored, so a test harness invoking this more than once is harmless.
pub fn init(version: impl Into<String>, codename: impl Into<String>) {
    let _ = BUILD_INFO.set(BuildInfo {
        version: version.into(),
        codename: codename.into(),
        start_date: SystemTime::now(),
    });
}

/// Returns the build info, initializing it with `dev`/`unreleased`
/// defaults if `init` was never called.
pub fn get() -> &'static BuildInfo {
    BUILD_INFO.get_or_init(|| BuildInfo {
        version: "dev".to_string(),
        codename: "unreleased".to_string(),
        start_date: SystemTime::now(),
    })
}

mod start_date {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        s.serialize_u64(secs)
    }
}
