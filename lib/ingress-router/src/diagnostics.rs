//! Non-fatal build diagnostics (spec §4.4: "Output: one `RoutingTable`
//! plus a non-fatal diagnostics list"). A router carrying a diagnostic
//! is omitted from the table; the rest of the build proceeds.

use std::fmt;

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub router: String,
    pub reason: Reason,
}

#[derive(Clone, Debug)]
pub enum Reason {
    MissingService(String),
    MissingMiddleware(String),
    MiddlewareCycle(String),
    SyntaxError(String),
    ServiceDepthExceeded,
    MissingCertificate(String),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::MissingService(name) => write!(f, "references unknown service `{name}`"),
            Reason::MissingMiddleware(name) => {
                write!(f, "references unknown middleware `{name}`")
            }
            Reason::MiddlewareCycle(name) => {
                write!(f, "middleware chain cycle detected at `{name}`")
            }
            Reason::SyntaxError(msg) => write!(f, "rule syntax error: {msg}"),
            Reason::ServiceDepthExceeded => write!(f, "ServiceDepthExceeded"),
            Reason::MissingCertificate(domain) => {
                write!(f, "no certificate available yet for domain `{domain}`")
            }
        }
    }
}

impl Diagnostic {
    pub fn new(router: impl Into<String>, reason: Reason) -> Self {
        Self {
            router: router.into(),
            reason,
        }
    }
}
