//! Shared vocabulary for the ingress runtime: the boxed error alias every
//! crate propagates with `?`, a minimal `Addr` type for backend endpoints,
//! the read-only build-info singleton, and the structured observability
//! events the dispatch path publishes.

#![deny(rust_2018_idioms)]

pub mod addr;
pub mod build_info;
pub mod events;

pub use addr::Addr;
pub use events::Event;

/// The error type propagated across crate boundaries in the ingress
/// runtime. Leaf crates define their own `thiserror` enums and convert
/// into this via `?` at the point where the concrete type stops mattering
/// to the caller.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
