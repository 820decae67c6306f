//! The hot-swap switcher (C7, spec §4.7): compiles router-builder output
//! into a dispatcher-ready [`CompiledTable`] and publishes it behind a
//! single atomic reference, draining the previous table by refcount.

#![deny(rust_2018_idioms)]

mod compiled;
mod switcher;

pub use compiled::{compile, CompiledRouter, CompiledTable};
pub use switcher::{DrainPolicy, Switcher};
