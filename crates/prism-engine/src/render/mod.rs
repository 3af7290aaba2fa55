//! Render drivers.
//!
//! Drivers own a [`SourceCache`](crate::shader::SourceCache) for their family
//! of shaders, push their per-frame matrices, and hand geometry to the caller's
//! [`Drawable`]s. They never touch vertex data themselves.
//!
//! Convention:
//! - matrices are column-major glam `Mat4`, right-handed, GL clip space
//! - a screen-space drawable is a full-screen quad in NDC

mod camera;
mod ray_marcher;
mod ray_tracer;

use std::cell::RefCell;

use glam::Mat4;

pub use camera::Camera;
pub use ray_marcher::{ObjectId, RayMarcher, SdfObject};
pub use ray_tracer::RayTracer;

/// Geometry the driver can submit.
pub trait Drawable {
    /// Issues the draw call. The program and uniforms are already bound.
    fn draw(&self);

    /// `true` for geometry placed by a model matrix, `false` for screen-space
    /// passes.
    fn is_world_space(&self) -> bool {
        true
    }
}

/// Source of view and projection matrices.
pub trait CameraView {
    fn view_matrix(&self) -> Mat4;
    fn proj_matrix(&self) -> Mat4;
}

impl<C: CameraView> CameraView for RefCell<C> {
    fn view_matrix(&self) -> Mat4 {
        self.borrow().view_matrix()
    }

    fn proj_matrix(&self) -> Mat4 {
        self.borrow().proj_matrix()
    }
}
