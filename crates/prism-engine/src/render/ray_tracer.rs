use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use crate::backend::ProgramBackend;
use crate::config::{EngineConfig, ResolvedSources};
use crate::error::ShaderError;
use crate::material::Material;
use crate::shader::{ReloadReport, Shader, SourceCache, reload_shaders};

use super::{Camera, CameraView, Drawable};

/// Full-screen ray tracer.
///
/// One shader (`library + scene fragment + ray-tracer driver`) drawn over a
/// screen-space quad. Each frame pushes `_rt_Time` (seconds since creation),
/// `_rt_View`, `_rt_InvView`, `_rt_Proj` and `_rt_InvProj`.
pub struct RayTracer {
    sources: Rc<SourceCache>,
    shader: Rc<Shader>,
    material: Material,
    screen: Rc<dyn Drawable>,
    camera: Camera,
    started: Instant,
}

impl RayTracer {
    pub fn new(
        backend: Rc<dyn ProgramBackend>,
        paths: &ResolvedSources,
        fragment_path: impl AsRef<Path>,
        screen: Rc<dyn Drawable>,
    ) -> Result<Self, ShaderError> {
        let sources = Rc::new(SourceCache::new(&paths.library, &paths.driver));
        let shader = Rc::new(Shader::load(
            backend,
            &paths.vertex,
            fragment_path.as_ref(),
            Some(sources.clone()),
        )?);

        Ok(Self {
            material: Material::new(shader.clone()),
            sources,
            shader,
            screen,
            camera: Camera::default(),
            started: Instant::now(),
        })
    }

    pub fn from_config(
        backend: Rc<dyn ProgramBackend>,
        config: &EngineConfig,
        fragment_path: impl AsRef<Path>,
        screen: Rc<dyn Drawable>,
    ) -> Result<Self, ShaderError> {
        Self::new(backend, &config.ray_tracer_paths(), fragment_path, screen)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    pub fn shader(&self) -> &Rc<Shader> {
        &self.shader
    }

    pub fn source_cache(&self) -> &Rc<SourceCache> {
        &self.sources
    }

    pub fn render(&mut self) {
        let view = self.camera.view_matrix();
        let proj = self.camera.proj_matrix();

        self.material.bind();

        let time = self.started.elapsed().as_secs_f32();
        self.shader.set_uniform_named("_rt_Time", &time);
        self.shader.set_uniform_named("_rt_View", &view);
        self.shader.set_uniform_named("_rt_InvView", &view.inverse());
        self.shader.set_uniform_named("_rt_Proj", &proj);
        self.shader.set_uniform_named("_rt_InvProj", &proj.inverse());

        self.screen.draw();
    }

    /// Refreshes the shared sources, then reloads the scene shader.
    pub fn reload_shaders(&self) -> ReloadReport {
        reload_shaders(&self.sources, [&self.shader])
    }
}
