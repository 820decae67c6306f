//! Plugin (spec §3): third-party middleware kind. Out-of-tree plugin
//! execution (WASM or dynamic loading) is outside this repo's scope; a
//! configured plugin passes the request through unmodified and logs once
//! at compile time so a missing capability is visible rather than silent.

use crate::chain::{Handler, Middleware};
use crate::error::MiddlewareError;
use crate::request::{MiddlewareRequest, MiddlewareResponse};
use async_trait::async_trait;

pub struct Plugin {
    name: String,
}

impl Plugin {
    pub fn new(name: String) -> Self {
        tracing::warn!(plugin = %name, "plugin middleware has no runtime support, passing through");
        Self { name }
    }
}

#[async_trait]
impl Middleware for Plugin {
    async fn handle(
        &self,
        req: MiddlewareRequest,
        next: &(dyn Handler + Sync),
    ) -> Result<MiddlewareResponse, MiddlewareError> {
        let _ = &self.name;
        next.call(req).await
    }

    fn kind(&self) -> &'static str {
        "plugin"
    }
}
