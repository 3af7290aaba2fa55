//! Shader programs.
//!
//! - [`types`]: uniform type tags and the Rust types bound to them
//! - [`reflect`]: per-program active-uniform tables
//! - [`compiler`]: stage compilation and linking
//! - [`Shader`]: a program with hot reload and typed uniform access
//! - [`SourceCache`]: library/driver sources shared by a family of shaders

pub mod compiler;
mod program;
pub mod reflect;
mod source_cache;
pub mod types;

pub use program::{ReloadOutcome, Shader};
pub use reflect::{UniformDescriptor, UniformIndex, UniformTable};
pub use source_cache::{ReloadReport, SourceCache, reload_shaders};
pub use types::{
    Mat2x3, Mat2x4, Mat3x2, Mat3x4, Mat4x2, Mat4x3, UniformShape, UniformType, UniformValue,
};
