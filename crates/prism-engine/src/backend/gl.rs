use glow::HasContext;

use super::{
    ActiveUniform, ProgramBackend, ProgramId, ShaderStage, StageId, TextureId, UniformLocation,
};

/// OpenGL driver over a `glow` context.
///
/// The context must be current on the calling thread for the lifetime of this
/// value. Handles are native GL object names; this backend does not support
/// the web (`WebGlRenderingContext`) flavour of `glow`.
pub struct GlBackend {
    gl: glow::Context,
}

impl GlBackend {
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    /// Returns the wrapped context for draw submission outside the engine.
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

#[inline]
fn program(id: ProgramId) -> glow::NativeProgram {
    glow::NativeProgram(id.0)
}

#[inline]
fn shader(id: StageId) -> glow::NativeShader {
    glow::NativeShader(id.0)
}

#[inline]
fn location(loc: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(loc.0)
}

// All calls below are plain GL entry points on the current context. The only
// invariant glow cannot check is that handles belong to this context, which
// holds because every handle was produced by this backend.

impl ProgramBackend for GlBackend {
    fn compile_stage(&self, stage: ShaderStage, sources: &[&str]) -> Result<StageId, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        let source = sources.concat();

        unsafe {
            let handle = self.gl.create_shader(kind)?;
            self.gl.shader_source(handle, &source);
            self.gl.compile_shader(handle);

            if self.gl.get_shader_compile_status(handle) {
                Ok(StageId(handle.0))
            } else {
                let log = self.gl.get_shader_info_log(handle);
                self.gl.delete_shader(handle);
                Err(log)
            }
        }
    }

    fn delete_stage(&self, stage: StageId) {
        unsafe { self.gl.delete_shader(shader(stage)) }
    }

    fn link_program(&self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        unsafe {
            let handle = self.gl.create_program()?;
            self.gl.attach_shader(handle, shader(vertex));
            self.gl.attach_shader(handle, shader(fragment));
            self.gl.link_program(handle);
            self.gl.detach_shader(handle, shader(vertex));
            self.gl.detach_shader(handle, shader(fragment));

            if self.gl.get_program_link_status(handle) {
                Ok(ProgramId(handle.0))
            } else {
                let log = self.gl.get_program_info_log(handle);
                self.gl.delete_program(handle);
                Err(log)
            }
        }
    }

    fn delete_program(&self, id: ProgramId) {
        unsafe { self.gl.delete_program(program(id)) }
    }

    fn use_program(&self, id: ProgramId) {
        unsafe { self.gl.use_program(Some(program(id))) }
    }

    fn active_uniforms(&self, id: ProgramId) -> Vec<ActiveUniform> {
        unsafe {
            let count = self.gl.get_active_uniforms(program(id));
            (0..count)
                .filter_map(|i| self.gl.get_active_uniform(program(id), i))
                .map(|u| ActiveUniform {
                    name: u.name,
                    gl_type: u.utype,
                    array_len: u.size.max(1) as u32,
                })
                .collect()
        }
    }

    fn uniform_location(&self, id: ProgramId, name: &str) -> Option<UniformLocation> {
        unsafe {
            self.gl
                .get_uniform_location(program(id), name)
                .map(|l| UniformLocation(l.0))
        }
    }

    fn set_uniform_f32(&self, loc: UniformLocation, width: usize, values: &[f32]) {
        let loc = location(loc);
        unsafe {
            match width {
                1 => self.gl.uniform_1_f32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_f32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_f32_slice(Some(&loc), values),
                4 => self.gl.uniform_4_f32_slice(Some(&loc), values),
                _ => log::warn!("unsupported float vector width {width}"),
            }
        }
    }

    fn set_uniform_i32(&self, loc: UniformLocation, width: usize, values: &[i32]) {
        let loc = location(loc);
        unsafe {
            match width {
                1 => self.gl.uniform_1_i32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_i32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_i32_slice(Some(&loc), values),
                4 => self.gl.uniform_4_i32_slice(Some(&loc), values),
                _ => log::warn!("unsupported int vector width {width}"),
            }
        }
    }

    fn set_uniform_u32(&self, loc: UniformLocation, width: usize, values: &[u32]) {
        let loc = location(loc);
        unsafe {
            match width {
                1 => self.gl.uniform_1_u32_slice(Some(&loc), values),
                2 => self.gl.uniform_2_u32_slice(Some(&loc), values),
                3 => self.gl.uniform_3_u32_slice(Some(&loc), values),
                4 => self.gl.uniform_4_u32_slice(Some(&loc), values),
                _ => log::warn!("unsupported uint vector width {width}"),
            }
        }
    }

    fn set_uniform_matrix(&self, loc: UniformLocation, columns: usize, rows: usize, values: &[f32]) {
        let loc = Some(location(loc));
        let loc = loc.as_ref();
        unsafe {
            match (columns, rows) {
                (2, 2) => self.gl.uniform_matrix_2_f32_slice(loc, false, values),
                (2, 3) => self.gl.uniform_matrix_2x3_f32_slice(loc, false, values),
                (2, 4) => self.gl.uniform_matrix_2x4_f32_slice(loc, false, values),
                (3, 2) => self.gl.uniform_matrix_3x2_f32_slice(loc, false, values),
                (3, 3) => self.gl.uniform_matrix_3_f32_slice(loc, false, values),
                (3, 4) => self.gl.uniform_matrix_3x4_f32_slice(loc, false, values),
                (4, 2) => self.gl.uniform_matrix_4x2_f32_slice(loc, false, values),
                (4, 3) => self.gl.uniform_matrix_4x3_f32_slice(loc, false, values),
                (4, 4) => self.gl.uniform_matrix_4_f32_slice(loc, false, values),
                _ => log::warn!("unsupported matrix shape {columns}x{rows}"),
            }
        }
    }

    fn get_uniform_f32(&self, id: ProgramId, loc: UniformLocation, out: &mut [f32]) {
        unsafe { self.gl.get_uniform_f32(program(id), &location(loc), out) }
    }

    fn get_uniform_i32(&self, id: ProgramId, loc: UniformLocation, out: &mut [i32]) {
        unsafe { self.gl.get_uniform_i32(program(id), &location(loc), out) }
    }

    fn get_uniform_u32(&self, id: ProgramId, loc: UniformLocation, out: &mut [u32]) {
        // glGetUniformuiv is not exposed by glow; the bit pattern is identical.
        let out: &mut [i32] = bytemuck::cast_slice_mut(out);
        unsafe { self.gl.get_uniform_i32(program(id), &location(loc), out) }
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, Some(glow::NativeTexture(texture.0)));
        }
    }
}
