//! Per-object uniform values.
//!
//! A [`Material`] stages values for one [`Shader`](crate::shader::Shader) in a
//! flat pool of 32-bit words and pushes them on [`Material::bind`].
//!
//! Properties are looked up by uniform name and keyed by the uniform's
//! location, so two names resolving to the same uniform share one slot.

mod pool;
mod property;

pub use pool::Material;
pub use property::{PropertyId, PropertyKey, PropertyMut};
