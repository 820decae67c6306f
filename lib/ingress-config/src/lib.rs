//! The dynamic configuration data model (spec §3), the label decoder/
//! encoder (C1, spec §4.1), the static configuration loaded at startup,
//! and the provider contract (C2, spec §4.2/§6).

#![deny(rust_2018_idioms)]

pub mod aggregator;
pub mod dynamic;
pub mod label;
pub mod provider;
pub mod static_config;

pub use aggregator::Aggregator;
pub use dynamic::Snapshot;
pub use provider::{Provider, ProviderMessage};
