use std::ops::Range;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{TextureId, UniformLocation};
use crate::config::DEFAULT_MAX_TEXTURE_UNITS;
use crate::error::MaterialError;
use crate::shader::{Shader, UniformIndex, UniformType, UniformValue};

use super::property::{PropertyId, PropertyKey, PropertyMut};

#[derive(Debug)]
struct Property {
    /// Name the property was first resolved under; used to re-resolve it
    /// after the shader recompiles.
    name: String,
    id: PropertyId,
    words: usize,
    ty: UniformType,
    /// `None` while the uniform is absent or has a different type in the
    /// current program.
    index: Option<UniformIndex>,
}

impl Property {
    fn range(&self) -> Range<usize> {
        self.id.offset()..self.id.offset() + self.words
    }
}

/// Property values for one shader.
#[derive(Debug)]
pub struct Material {
    shader: Rc<Shader>,
    pool: Vec<u32>,
    /// Registration order; offsets are ascending.
    properties: Vec<Property>,
    by_location: FxHashMap<UniformLocation, PropertyId>,
    missing: FxHashSet<String>,
    textures: Vec<TextureId>,
    max_texture_units: usize,
    generation: u32,
}

impl Material {
    pub fn new(shader: Rc<Shader>) -> Self {
        Self::with_max_texture_units(shader, DEFAULT_MAX_TEXTURE_UNITS)
    }

    pub fn with_max_texture_units(shader: Rc<Shader>, max_texture_units: usize) -> Self {
        let generation = shader.generation();
        Self {
            shader,
            pool: Vec::new(),
            properties: Vec::new(),
            by_location: FxHashMap::default(),
            missing: FxHashSet::default(),
            textures: Vec::new(),
            max_texture_units,
            generation,
        }
    }

    pub fn shader(&self) -> &Rc<Shader> {
        &self.shader
    }

    /// Resolves `name` to a property, allocating a pool slot on first use.
    ///
    /// Returns `None` if the shader has no active uniform of that name. Each
    /// missing name is logged once per material.
    pub fn find_property(&mut self, name: &str) -> Option<PropertyId> {
        self.sync();

        let resolved = self
            .shader
            .uniform_location(name)
            .and_then(|location| Some((location, self.shader.uniform_index_at(location)?)));
        let Some((location, index)) = resolved else {
            self.report_missing(name, "property not found");
            return None;
        };

        if let Some(&id) = self.by_location.get(&location) {
            return Some(id);
        }

        let ty = self.shader.uniform_type(index)?;
        if !ty.is_supported() {
            self.report_missing(name, "property has an unsupported uniform type");
            return None;
        }

        let id = PropertyId(self.pool.len() as u32);
        let words = ty.word_count();
        self.pool.resize(self.pool.len() + words, 0);
        self.properties.push(Property {
            name: name.to_string(),
            id,
            words,
            ty,
            index: Some(index),
        });
        self.by_location.insert(location, id);

        log::trace!("{}: property `{name}` -> {id} ({ty:?})", self.shader.label());
        Some(id)
    }

    /// Stores `value` in the property's slot.
    ///
    /// Returns `false` and leaves the pool unchanged if the property does not
    /// exist or the shader's uniform behind it is not of type `T`.
    pub fn set_property_value<'k, T: UniformValue>(&mut self, key: impl Into<PropertyKey<'k>>, value: &T) -> bool {
        let Some(range) = self.checked_range::<T>(key.into(), true) else {
            return false;
        };
        self.pool[range].copy_from_slice(bytemuck::cast_slice(std::slice::from_ref(value)));
        true
    }

    /// Reads the staged value back, typed as the uniform was when the
    /// property was created.
    pub fn get_property_value<'k, T: UniformValue>(&mut self, key: impl Into<PropertyKey<'k>>) -> Option<T> {
        let range = self.checked_range::<T>(key.into(), false)?;
        Some(bytemuck::pod_read_unaligned(bytemuck::cast_slice(&self.pool[range])))
    }

    /// Typed in-place access to the staged value.
    ///
    /// The guard borrows the material mutably; no property can be added
    /// while it is alive.
    pub fn property_mut<'k, T: UniformValue>(
        &mut self,
        key: impl Into<PropertyKey<'k>>,
    ) -> Option<PropertyMut<'_, T>> {
        let range = self.checked_range::<T>(key.into(), true)?;
        Some(PropertyMut::new(&mut self.pool[range]))
    }

    /// Binds a texture to the next free unit and points `sampler` at it.
    ///
    /// Returns the unit. Fails once every unit is taken; nothing is changed
    /// in that case.
    pub fn add_texture(&mut self, sampler: &str, texture: TextureId) -> Result<u32, MaterialError> {
        if self.textures.len() >= self.max_texture_units {
            return Err(MaterialError::TextureUnitsExhausted {
                sampler: sampler.to_string(),
                max: self.max_texture_units,
            });
        }

        let unit = self.textures.len() as u32;
        self.set_property_value(sampler, &(unit as i32));
        self.textures.push(texture);
        Ok(unit)
    }

    /// Makes the shader current, pushes every property in registration order,
    /// then binds textures to units `0..n`.
    pub fn bind(&mut self) {
        self.sync();
        self.shader.bind();

        for property in &self.properties {
            if let Some(index) = property.index {
                self.shader.set_uniform_raw(index, &self.pool[property.range()]);
            }
        }

        let backend = self.shader.backend();
        for (unit, &texture) in self.textures.iter().enumerate() {
            backend.bind_texture(unit as u32, texture);
        }
    }

    // ── inspection ────────────────────────────────────────────────────────

    /// The raw value pool.
    pub fn pool(&self) -> &[u32] {
        &self.pool
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Names already reported as missing.
    pub fn missing_properties(&self) -> impl Iterator<Item = &str> {
        self.missing.iter().map(String::as_str)
    }

    pub fn textures(&self) -> &[TextureId] {
        &self.textures
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn resolve(&mut self, key: PropertyKey<'_>) -> Option<&Property> {
        let id = match key {
            PropertyKey::Id(id) => id,
            PropertyKey::Name(name) => self.find_property(name)?,
        };
        let at = self
            .properties
            .binary_search_by_key(&id, |p| p.id)
            .ok()?;
        Some(&self.properties[at])
    }

    /// Type-checks `key` against `T` and returns its pool words.
    ///
    /// Writes must also reach a uniform: they are checked against the current
    /// program, and a property left unbound by a reload rejects them.
    fn checked_range<T: UniformValue>(&mut self, key: PropertyKey<'_>, write: bool) -> Option<Range<usize>> {
        self.sync();
        let shader = Rc::clone(&self.shader);
        let property = self.resolve(key)?;

        if !property.ty.accepts(T::UNIFORM_TYPE) {
            log::warn!(
                "{}: invalid property `{}`: uniform is {:?}, value is {:?}",
                shader.label(),
                property.name,
                property.ty,
                T::UNIFORM_TYPE
            );
            return None;
        }
        if write && !property.index.is_some_and(|index| shader.validate_uniform::<T>(index)) {
            log::warn!(
                "{}: invalid property `{}`: no active {:?} uniform in the current program",
                shader.label(),
                property.name,
                T::UNIFORM_TYPE
            );
            return None;
        }
        Some(property.range())
    }

    fn report_missing(&mut self, name: &str, reason: &str) {
        if self.missing.insert(name.to_string()) {
            log::warn!("{}: {reason}: `{name}`", self.shader.label());
        }
    }

    /// Re-resolves every property after the shader recompiled.
    fn sync(&mut self) {
        let generation = self.shader.generation();
        if generation == self.generation {
            return;
        }
        self.generation = generation;
        self.by_location.clear();

        for property in &mut self.properties {
            property.index = None;

            let Some(location) = self.shader.uniform_location(&property.name) else {
                log::debug!("{}: property `{}` is inactive", self.shader.label(), property.name);
                continue;
            };
            let Some(index) = self.shader.uniform_index_at(location) else {
                continue;
            };

            if self.shader.uniform_type(index) != Some(property.ty) {
                log::warn!(
                    "{}: property `{}` changed type; it is no longer bound",
                    self.shader.label(),
                    property.name
                );
                continue;
            }
            if self.by_location.contains_key(&location) {
                continue;
            }

            property.index = Some(index);
            self.by_location.insert(location, property.id);
        }
    }
}
