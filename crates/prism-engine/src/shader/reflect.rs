//! Active-uniform reflection.
//!
//! A [`UniformTable`] is built from a linked program's active-uniform list and
//! rebuilt from scratch on every successful reload. Each descriptor carries the
//! type-specific adapters that move 32-bit words between the engine and the
//! driver.

use rustc_hash::FxHashMap;

use crate::backend::{ProgramBackend, ProgramId, UniformLocation};

use super::types::{UniformShape, UniformType};

/// Reads one uniform value back from a live program into `out` (word units).
pub type UniformGetter = fn(&dyn ProgramBackend, ProgramId, UniformLocation, &mut [u32]);

/// Writes one uniform value (word units) to the current program.
pub type UniformSetter = fn(&dyn ProgramBackend, UniformLocation, &[u32]);

/// Dense index into a [`UniformTable`].
///
/// Indices are tied to the table generation that produced them; after a reload
/// an old index resolves to nothing and must be looked up again by name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformIndex {
    slot: u32,
    generation: u32,
}

impl UniformIndex {
    pub fn slot(self) -> usize {
        self.slot as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// One active uniform.
#[derive(Debug, Clone)]
pub struct UniformDescriptor {
    pub name: String,
    pub location: UniformLocation,
    pub ty: UniformType,
    /// Declared array length. Arrays are addressed through their first element.
    pub array_len: u32,
    get: UniformGetter,
    set: UniformSetter,
}

impl UniformDescriptor {
    /// Size in bytes of one value of this uniform.
    pub fn byte_size(&self) -> usize {
        self.ty.byte_size()
    }

    pub fn word_count(&self) -> usize {
        self.ty.word_count()
    }

    /// Pushes `words` to this uniform's location in the current program.
    pub fn write(&self, backend: &dyn ProgramBackend, words: &[u32]) {
        debug_assert_eq!(words.len(), self.word_count());
        (self.set)(backend, self.location, words)
    }

    /// Reads the live value from `program` into `out`.
    pub fn read(&self, backend: &dyn ProgramBackend, program: ProgramId, out: &mut [u32]) {
        debug_assert_eq!(out.len(), self.word_count());
        (self.get)(backend, program, self.location, out)
    }
}

/// Reflected uniform table of one program generation.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    generation: u32,
    uniforms: Vec<UniformDescriptor>,
    by_location: FxHashMap<UniformLocation, u32>,
}

impl UniformTable {
    /// Enumerates `program`'s active uniforms.
    ///
    /// Uniforms without a location (block members) are not addressable and
    /// get no descriptor.
    pub fn reflect(backend: &dyn ProgramBackend, program: ProgramId, generation: u32) -> Self {
        let mut table = Self {
            generation,
            ..Self::default()
        };

        for active in backend.active_uniforms(program) {
            let name = match active.name.strip_suffix("[0]") {
                Some(base) => base.to_string(),
                None => active.name,
            };

            let Some(location) = backend.uniform_location(program, &name) else {
                log::debug!("uniform `{name}` has no location; skipped");
                continue;
            };

            let ty = UniformType::from_gl(active.gl_type);
            if !ty.is_supported() {
                log::warn!(
                    "uniform `{name}` has unsupported type 0x{:04X}; it can't back a property",
                    active.gl_type
                );
            }
            if active.array_len > 1 {
                log::warn!(
                    "uniform `{name}` is an array of {}; only the first element is bound",
                    active.array_len
                );
            }

            let adapters = adapters(ty);
            let slot = table.uniforms.len() as u32;
            table.by_location.insert(location, slot);
            table.uniforms.push(UniformDescriptor {
                name,
                location,
                ty,
                array_len: active.array_len,
                get: adapters.get,
                set: adapters.set,
            });
        }

        table
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.uniforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uniforms.is_empty()
    }

    /// Descriptor for `index`, or `None` if the index is from another generation.
    pub fn get(&self, index: UniformIndex) -> Option<&UniformDescriptor> {
        if index.generation != self.generation {
            return None;
        }
        self.uniforms.get(index.slot())
    }

    /// Reverse lookup from a location to its index.
    pub fn index_at(&self, location: UniformLocation) -> Option<UniformIndex> {
        self.by_location.get(&location).map(|&slot| UniformIndex {
            slot,
            generation: self.generation,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (UniformIndex, &UniformDescriptor)> {
        let generation = self.generation;
        self.uniforms.iter().enumerate().map(move |(slot, d)| {
            (
                UniformIndex {
                    slot: slot as u32,
                    generation,
                },
                d,
            )
        })
    }
}

// ── type adapters ─────────────────────────────────────────────────────────

struct TypeAdapters {
    get: UniformGetter,
    set: UniformSetter,
}

fn adapters(ty: UniformType) -> TypeAdapters {
    match ty.shape() {
        UniformShape::Float { width } => TypeAdapters {
            get: get_f32,
            set: match width {
                1 => set_f32::<1>,
                2 => set_f32::<2>,
                3 => set_f32::<3>,
                _ => set_f32::<4>,
            },
        },
        UniformShape::Int { width } => TypeAdapters {
            get: get_i32,
            set: match width {
                1 => set_i32::<1>,
                2 => set_i32::<2>,
                3 => set_i32::<3>,
                _ => set_i32::<4>,
            },
        },
        UniformShape::Uint { width } => TypeAdapters {
            get: get_u32,
            set: match width {
                1 => set_u32::<1>,
                2 => set_u32::<2>,
                3 => set_u32::<3>,
                _ => set_u32::<4>,
            },
        },
        UniformShape::Matrix { columns, rows } => TypeAdapters {
            get: get_f32,
            set: match (columns, rows) {
                (2, 2) => set_matrix::<2, 2>,
                (2, 3) => set_matrix::<2, 3>,
                (2, 4) => set_matrix::<2, 4>,
                (3, 2) => set_matrix::<3, 2>,
                (3, 3) => set_matrix::<3, 3>,
                (3, 4) => set_matrix::<3, 4>,
                (4, 2) => set_matrix::<4, 2>,
                (4, 3) => set_matrix::<4, 3>,
                _ => set_matrix::<4, 4>,
            },
        },
        UniformShape::Unsupported => TypeAdapters {
            get: get_none,
            set: set_none,
        },
    }
}

fn get_f32(backend: &dyn ProgramBackend, program: ProgramId, loc: UniformLocation, out: &mut [u32]) {
    backend.get_uniform_f32(program, loc, bytemuck::cast_slice_mut(out))
}

fn get_i32(backend: &dyn ProgramBackend, program: ProgramId, loc: UniformLocation, out: &mut [u32]) {
    backend.get_uniform_i32(program, loc, bytemuck::cast_slice_mut(out))
}

fn get_u32(backend: &dyn ProgramBackend, program: ProgramId, loc: UniformLocation, out: &mut [u32]) {
    backend.get_uniform_u32(program, loc, out)
}

fn get_none(_: &dyn ProgramBackend, _: ProgramId, _: UniformLocation, _: &mut [u32]) {}

fn set_f32<const W: usize>(backend: &dyn ProgramBackend, loc: UniformLocation, words: &[u32]) {
    backend.set_uniform_f32(loc, W, bytemuck::cast_slice(words))
}

fn set_i32<const W: usize>(backend: &dyn ProgramBackend, loc: UniformLocation, words: &[u32]) {
    backend.set_uniform_i32(loc, W, bytemuck::cast_slice(words))
}

fn set_u32<const W: usize>(backend: &dyn ProgramBackend, loc: UniformLocation, words: &[u32]) {
    backend.set_uniform_u32(loc, W, words)
}

fn set_matrix<const C: usize, const R: usize>(
    backend: &dyn ProgramBackend,
    loc: UniformLocation,
    words: &[u32],
) {
    backend.set_uniform_matrix(loc, C, R, bytemuck::cast_slice(words))
}

fn set_none(_: &dyn ProgramBackend, _: UniformLocation, _: &[u32]) {}
