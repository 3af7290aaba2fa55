//! GPU driver boundary.
//!
//! This module defines the program/shader/uniform object model the engine is
//! written against:
//! - compiling stages and linking them into programs
//! - enumerating a program's active uniforms
//! - typed uniform writes (to the current program) and reads
//! - texture-unit binding
//!
//! [`GlBackend`] drives a real OpenGL context through `glow`.
//! [`HeadlessBackend`] is a software driver for tests and tools.

mod gl;
pub mod headless;

use std::fmt;
use std::num::NonZeroU32;

pub use gl::GlBackend;
pub use headless::HeadlessBackend;

/// Programmable pipeline stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Driver handle of a compiled (not yet linked) stage object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StageId(pub NonZeroU32);

/// Driver handle of a linked program object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub NonZeroU32);

/// Driver handle of a texture object.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureId(pub NonZeroU32);

/// Location of an active uniform inside one linked program.
///
/// Inactive (optimized out) uniforms have no location; lookups return `None`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

/// One entry of a program's active-uniform list, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    pub name: String,
    /// Raw GL type enum (`GL_FLOAT_VEC3`, `GL_SAMPLER_2D`, ...).
    pub gl_type: u32,
    /// Array length; 1 for plain uniforms.
    pub array_len: u32,
}

/// The driver operations the engine needs.
///
/// Methods take `&self`: drivers are immediate-mode state machines owned by the
/// render thread, the same way `glow::Context` is used.
///
/// Uniform writes target the program made current by [`use_program`]. Writes
/// to a location the current program does not have are ignored.
///
/// [`use_program`]: ProgramBackend::use_program
pub trait ProgramBackend {
    /// Compiles one stage from source fragments concatenated in order.
    ///
    /// On failure the stage object is released and the driver log returned.
    fn compile_stage(&self, stage: ShaderStage, sources: &[&str]) -> Result<StageId, String>;

    fn delete_stage(&self, stage: StageId);

    /// Links a program. On failure the program object is released and the
    /// driver log returned. Stages stay alive; the caller deletes them.
    fn link_program(&self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String>;

    fn delete_program(&self, program: ProgramId);

    fn use_program(&self, program: ProgramId);

    /// Active uniforms in driver order.
    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// `width` is the vector width (1..=4); `values.len()` is a multiple of it.
    fn set_uniform_f32(&self, location: UniformLocation, width: usize, values: &[f32]);
    fn set_uniform_i32(&self, location: UniformLocation, width: usize, values: &[i32]);
    fn set_uniform_u32(&self, location: UniformLocation, width: usize, values: &[u32]);

    /// Column-major `columns x rows` float matrix.
    fn set_uniform_matrix(&self, location: UniformLocation, columns: usize, rows: usize, values: &[f32]);

    fn get_uniform_f32(&self, program: ProgramId, location: UniformLocation, out: &mut [f32]);
    fn get_uniform_i32(&self, program: ProgramId, location: UniformLocation, out: &mut [i32]);
    fn get_uniform_u32(&self, program: ProgramId, location: UniformLocation, out: &mut [u32]);

    /// Binds a 2D texture to texture unit `unit`.
    fn bind_texture(&self, unit: u32, texture: TextureId);
}
