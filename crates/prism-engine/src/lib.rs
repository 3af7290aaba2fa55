//! Prism engine crate.
//!
//! Shader programs with reflected uniform tables, per-object material property
//! pools, and content-hash driven hot reload of shared shader sources.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod material;
pub mod render;
pub mod shader;

#[cfg(test)]
pub(crate) mod test_support;
