//! Relayer backends.
//!
//! Available implementations:
//! - `local`: broadcasts bundles from a locally held key through an Alloy provider

pub mod local;
