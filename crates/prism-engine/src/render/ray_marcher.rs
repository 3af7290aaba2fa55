use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glam::Mat4;

use crate::backend::ProgramBackend;
use crate::config::{EngineConfig, ResolvedSources};
use crate::error::ShaderError;
use crate::material::Material;
use crate::shader::{ReloadReport, Shader, SourceCache, reload_shaders};

use super::{CameraView, Drawable};

/// Stable handle of an object added to a [`RayMarcher`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ObjectId(u64);

/// One ray-marched object: geometry, the material it is shaded with, and its
/// placement.
pub struct SdfObject {
    pub geometry: Rc<dyn Drawable>,
    pub material: Rc<RefCell<Material>>,
    pub model: Mat4,
}

impl SdfObject {
    pub fn new(geometry: Rc<dyn Drawable>, material: Rc<RefCell<Material>>) -> Self {
        Self {
            geometry,
            material,
            model: Mat4::IDENTITY,
        }
    }

    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }
}

/// Draws signed-distance-field objects.
///
/// Every object's shader is compiled as `sdf library + object fragment +
/// ray-marcher driver`; the two shared sources live in this driver's
/// [`SourceCache`].
///
/// Per material change the driver pushes `_rm_Proj`; per object it pushes
/// `_rm_modelView`.
pub struct RayMarcher {
    backend: Rc<dyn ProgramBackend>,
    sources: Rc<SourceCache>,
    vertex_path: PathBuf,
    objects: Vec<(ObjectId, SdfObject)>,
    next_id: u64,
    camera: Option<Rc<dyn CameraView>>,
}

impl RayMarcher {
    pub fn new(backend: Rc<dyn ProgramBackend>, paths: &ResolvedSources) -> Self {
        Self {
            backend,
            sources: Rc::new(SourceCache::new(&paths.library, &paths.driver)),
            vertex_path: paths.vertex.clone(),
            objects: Vec::new(),
            next_id: 0,
            camera: None,
        }
    }

    pub fn from_config(backend: Rc<dyn ProgramBackend>, config: &EngineConfig) -> Self {
        Self::new(backend, &config.ray_marcher_paths())
    }

    /// Loads an object shader from `fragment_path` against this driver's
    /// shared sources.
    pub fn create_shader(&self, fragment_path: impl AsRef<Path>) -> Result<Rc<Shader>, ShaderError> {
        let shader = Shader::load(
            self.backend.clone(),
            &self.vertex_path,
            fragment_path.as_ref(),
            Some(self.sources.clone()),
        )?;
        Ok(Rc::new(shader))
    }

    pub fn set_camera(&mut self, camera: Option<Rc<dyn CameraView>>) {
        self.camera = camera;
    }

    pub fn add_object(&mut self, object: SdfObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push((id, object));
        id
    }

    /// Removes an object by moving the last one into its place. Returns the
    /// removed object.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<SdfObject> {
        let at = self.objects.iter().position(|(oid, _)| *oid == id)?;
        Some(self.objects.swap_remove(at).1)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SdfObject> {
        self.objects
            .iter_mut()
            .find_map(|(oid, obj)| (*oid == id).then_some(obj))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn source_cache(&self) -> &Rc<SourceCache> {
        &self.sources
    }

    /// Draws every object in list order.
    ///
    /// A material is bound only when it differs from the previous object's.
    /// World-space geometry gets `view * model`; screen-space passes get the
    /// inverse projection so the quad unprojects into view rays. Without a
    /// camera both view and projection are identity.
    pub fn render(&self) {
        let (view, proj) = match &self.camera {
            Some(camera) => (camera.view_matrix(), camera.proj_matrix()),
            None => (Mat4::IDENTITY, Mat4::IDENTITY),
        };

        let mut current: Option<&Rc<RefCell<Material>>> = None;
        let mut model_view = None;

        for (_, object) in &self.objects {
            if !current.is_some_and(|m| Rc::ptr_eq(m, &object.material)) {
                let mut material = object.material.borrow_mut();
                material.bind();

                let shader = material.shader();
                shader.set_uniform_named("_rm_Proj", &proj);
                model_view = shader.uniform_index("_rm_modelView");
                current = Some(&object.material);
            }

            if let Some(index) = model_view {
                let transform = if object.geometry.is_world_space() {
                    view * object.model
                } else {
                    proj.inverse()
                };
                object.material.borrow().shader().set_uniform(index, &transform);
            }

            object.geometry.draw();
        }
    }

    /// Refreshes the shared sources, then reloads each distinct object
    /// shader once.
    pub fn reload_shaders(&self) -> ReloadReport {
        let shaders: Vec<Rc<Shader>> = self
            .objects
            .iter()
            .map(|(_, o)| o.material.borrow().shader().clone())
            .collect();
        reload_shaders(&self.sources, &shaders)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec3, Vec4};

    use super::*;
    use crate::backend::headless::{BackendEvent, HeadlessMesh};
    use crate::backend::HeadlessBackend;
    use crate::render::Camera;
    use crate::test_support::{ShaderDir, VERTEX, headless};

    const OBJECT: &str = "uniform vec4 color;\nvec4 shade() { return color; }\n";

    struct Scene {
        dir: ShaderDir,
        backend: Rc<HeadlessBackend>,
        marcher: RayMarcher,
    }

    fn scene() -> Scene {
        let dir = ShaderDir::new();
        dir.write("raymarcher.vert", VERTEX);
        dir.write("sdflibrary.glsl", "float sdSphere(vec3 p);\n");
        dir.write(
            "raymarcher.glsl",
            "uniform mat4 _rm_Proj;\nuniform mat4 _rm_modelView;\n\
             void main() { _rm_Proj; _rm_modelView; shade(); }\n",
        );
        dir.write("a.glsl", OBJECT);
        dir.write("b.glsl", OBJECT);

        let config = EngineConfig {
            shader_folder: dir.root().to_path_buf(),
            ..EngineConfig::default()
        };
        let backend = headless();
        let marcher = RayMarcher::from_config(backend.clone(), &config);
        Scene { dir, backend, marcher }
    }

    fn material(scene: &Scene, file: &str) -> Rc<RefCell<Material>> {
        let shader = scene.marcher.create_shader(scene.dir.path(file)).unwrap();
        Rc::new(RefCell::new(Material::new(shader)))
    }

    fn mesh(scene: &Scene, label: &str) -> Rc<dyn Drawable> {
        Rc::new(HeadlessMesh::world(scene.backend.clone(), label))
    }

    fn draws(trace: &[BackendEvent]) -> Vec<String> {
        trace
            .iter()
            .filter_map(|e| match e {
                BackendEvent::Draw { label } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    fn binds(trace: &[BackendEvent]) -> usize {
        trace
            .iter()
            .filter(|e| matches!(e, BackendEvent::UseProgram(_)))
            .count()
    }

    fn matrix_words(m: Mat4) -> Vec<u32> {
        bytemuck::cast_slice(&m.to_cols_array()).to_vec()
    }

    // ── objects ───────────────────────────────────────────────────────────

    #[test]
    fn remove_swaps_last_into_place() {
        let mut s = scene();
        let m = material(&s, "a.glsl");
        let a = s.marcher.add_object(SdfObject::new(mesh(&s, "a"), m.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "b"), m.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "c"), m.clone()));

        assert!(s.marcher.remove_object(a).is_some());
        assert!(s.marcher.remove_object(a).is_none());
        assert_eq!(s.marcher.object_count(), 2);

        s.marcher.render();
        assert_eq!(draws(&s.backend.trace()), ["c", "b"]);
    }

    #[test]
    fn shared_material_is_bound_once_per_run() {
        let mut s = scene();
        let red = material(&s, "a.glsl");
        let blue = material(&s, "b.glsl");
        s.marcher.add_object(SdfObject::new(mesh(&s, "1"), red.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "2"), red.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "3"), blue.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "4"), red.clone()));

        s.marcher.render();
        let trace = s.backend.trace();
        assert_eq!(binds(&trace), 3);
        assert_eq!(draws(&trace), ["1", "2", "3", "4"]);
    }

    #[test]
    fn material_values_reach_the_program() {
        let mut s = scene();
        let m = material(&s, "a.glsl");
        m.borrow_mut().set_property_value("color", &Vec4::new(1.0, 0.5, 0.0, 1.0));
        s.marcher.add_object(SdfObject::new(mesh(&s, "a"), m.clone()));

        s.marcher.render();
        let shader = m.borrow().shader().clone();
        let color = shader.uniform_index("color").unwrap();
        assert_eq!(shader.get_uniform::<Vec4>(color), Some(Vec4::new(1.0, 0.5, 0.0, 1.0)));
    }

    // ── matrices ──────────────────────────────────────────────────────────

    #[test]
    fn world_geometry_gets_view_times_model() {
        let mut s = scene();
        let camera = Camera::default();
        s.marcher.set_camera(Some(Rc::new(camera)));
        let m = material(&s, "a.glsl");
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        s.marcher
            .add_object(SdfObject::new(mesh(&s, "a"), m.clone()).with_model(model));

        s.marcher.render();
        let shader = m.borrow().shader().clone();
        let proj = shader.uniform_index("_rm_Proj").unwrap();
        let mv = shader.uniform_index("_rm_modelView").unwrap();
        assert_eq!(shader.get_uniform::<Mat4>(proj), Some(camera.proj_matrix()));
        assert_eq!(shader.get_uniform::<Mat4>(mv), Some(camera.view_matrix() * model));
    }

    #[test]
    fn screen_pass_gets_inverse_projection() {
        let mut s = scene();
        let camera = Camera::default();
        s.marcher.set_camera(Some(Rc::new(RefCell::new(camera))));
        let m = material(&s, "a.glsl");
        let quad: Rc<dyn Drawable> = Rc::new(HeadlessMesh::screen(s.backend.clone(), "quad"));
        s.marcher.add_object(SdfObject::new(quad, m.clone()));

        s.marcher.render();
        let shader = m.borrow().shader().clone();
        let location = shader.uniform_location("_rm_modelView").unwrap();
        assert_eq!(
            s.backend.uniform_words(shader.program(), location),
            Some(matrix_words(camera.proj_matrix().inverse()))
        );
    }

    #[test]
    fn no_camera_means_identity() {
        let mut s = scene();
        let m = material(&s, "a.glsl");
        s.marcher.add_object(SdfObject::new(mesh(&s, "a"), m.clone()));
        let quad: Rc<dyn Drawable> = Rc::new(HeadlessMesh::screen(s.backend.clone(), "quad"));
        s.marcher.add_object(SdfObject::new(quad, m.clone()));

        s.marcher.render();
        let writes: Vec<_> = s
            .backend
            .trace()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::SetUniform { location, words, .. } => Some((location, words)),
                _ => None,
            })
            .collect();

        let shader = m.borrow().shader().clone();
        let mv = shader.uniform_location("_rm_modelView").unwrap();
        let mv_writes: Vec<Mat4> = writes
            .iter()
            .filter(|(l, _)| *l == mv)
            .map(|(_, words)| Mat4::from_cols_slice(bytemuck::cast_slice(words)))
            .collect();
        assert_eq!(mv_writes, [Mat4::IDENTITY, Mat4::IDENTITY]);
    }

    // ── reload ────────────────────────────────────────────────────────────

    #[test]
    fn library_change_recompiles_both_object_shaders() {
        let mut s = scene();
        let a = material(&s, "a.glsl");
        let b = material(&s, "b.glsl");
        s.marcher.add_object(SdfObject::new(mesh(&s, "a"), a.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "b"), b.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "b2"), b.clone()));
        assert_eq!(s.backend.programs_linked(), 2);

        assert_eq!(s.marcher.reload_shaders().recompiled, 0);

        s.dir.write("sdflibrary.glsl", "float sdSphere(vec3 p);\nfloat sdBox(vec3 p);\n");
        let report = s.marcher.reload_shaders();

        assert_eq!(report.recompiled, 2);
        assert_eq!(s.backend.programs_linked(), 4);
        assert!(!s.marcher.source_cache().has_source_changed());
    }

    #[test]
    fn own_change_recompiles_only_that_shader() {
        let mut s = scene();
        let a = material(&s, "a.glsl");
        let b = material(&s, "b.glsl");
        s.marcher.add_object(SdfObject::new(mesh(&s, "a"), a.clone()));
        s.marcher.add_object(SdfObject::new(mesh(&s, "b"), b.clone()));

        s.dir.write("a.glsl", "uniform vec3 color;\nvec4 shade() { return vec4(color, 1.0); }\n");
        let report = s.marcher.reload_shaders();

        assert_eq!(report.recompiled, 1);
        assert_eq!(report.unchanged, 1);
    }
}
