use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use xxhash_rust::xxh3::xxh3_64;

use crate::backend::{ProgramBackend, ProgramId, UniformLocation};
use crate::error::ShaderError;

use super::compiler::compile_program;
use super::reflect::{UniformDescriptor, UniformIndex, UniformTable};
use super::source_cache::SourceCache;
use super::types::{UniformType, UniformValue};

/// What a successful [`Shader::reload`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReloadOutcome {
    /// Sources and shared sources were unchanged; no GPU work was done.
    Unchanged,
    /// A new program replaced the old one and the uniform table was rebuilt.
    Recompiled,
}

/// A linked program built from a vertex and a fragment file, with its
/// reflected uniform table.
///
/// The program is owned exclusively and deleted on drop. A reload that fails
/// for any reason leaves the last good program and table in place.
///
/// Uniform writes go to whatever program is current on the driver; call
/// [`bind`](Self::bind) first.
pub struct Shader {
    backend: Rc<dyn ProgramBackend>,
    label: String,
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    sources: Option<Rc<SourceCache>>,

    program: Cell<ProgramId>,
    table: RefCell<UniformTable>,
    vertex_hash: Cell<u64>,
    fragment_hash: Cell<u64>,
    generation: Cell<u32>,
}

impl Shader {
    /// Reads, compiles and reflects a program.
    ///
    /// With `sources`, the fragment stage is compiled as
    /// `library + fragment file + driver`.
    pub fn load(
        backend: Rc<dyn ProgramBackend>,
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
        sources: Option<Rc<SourceCache>>,
    ) -> Result<Self, ShaderError> {
        let vertex_path = vertex_path.into();
        let fragment_path = fragment_path.into();
        let label = fragment_path
            .file_name()
            .map_or_else(|| fragment_path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let vertex = read_source(&vertex_path)?;
        let fragment = read_source(&fragment_path)?;

        let program = build(backend.as_ref(), &label, &vertex, &fragment, sources.as_deref())?;
        let table = UniformTable::reflect(backend.as_ref(), program, 0);

        log::info!("{label}: loaded with {} active uniforms", table.len());

        Ok(Self {
            backend,
            label,
            vertex_path,
            fragment_path,
            sources,
            program: Cell::new(program),
            table: RefCell::new(table),
            vertex_hash: Cell::new(xxh3_64(vertex.as_bytes())),
            fragment_hash: Cell::new(xxh3_64(fragment.as_bytes())),
            generation: Cell::new(0),
        })
    }

    /// Makes this program current.
    pub fn bind(&self) {
        self.backend.use_program(self.program.get());
    }

    /// Re-reads both files and recompiles if anything changed.
    ///
    /// Recompiles when either file's content hash differs from the last read,
    /// or when the attached [`SourceCache`] reports a change. Hashes are
    /// recorded before compiling, so a broken file is not retried until its
    /// content changes again.
    pub fn reload(&self) -> Result<ReloadOutcome, ShaderError> {
        let vertex = read_source(&self.vertex_path)?;
        let fragment = read_source(&self.fragment_path)?;

        let vertex_hash = xxh3_64(vertex.as_bytes());
        let fragment_hash = xxh3_64(fragment.as_bytes());
        let vertex_changed = self.vertex_hash.replace(vertex_hash) != vertex_hash;
        let fragment_changed = self.fragment_hash.replace(fragment_hash) != fragment_hash;
        let shared_changed = self.sources.as_ref().is_some_and(|s| s.has_source_changed());

        if !vertex_changed && !fragment_changed && !shared_changed {
            log::debug!("{}: unchanged, skipping recompile", self.label);
            return Ok(ReloadOutcome::Unchanged);
        }

        let program = build(
            self.backend.as_ref(),
            &self.label,
            &vertex,
            &fragment,
            self.sources.as_deref(),
        )?;

        let old = self.program.replace(program);
        self.backend.delete_program(old);

        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        *self.table.borrow_mut() = UniformTable::reflect(self.backend.as_ref(), program, generation);

        log::info!(
            "{}: recompiled (generation {generation}, {} active uniforms)",
            self.label,
            self.uniform_count()
        );
        Ok(ReloadOutcome::Recompiled)
    }

    // ── table accessors ───────────────────────────────────────────────────

    /// Driver location of `name`, or `None` if it is not an active uniform.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.backend.uniform_location(self.program.get(), name)
    }

    /// Index of the active uniform `name` resolves to.
    pub fn uniform_index(&self, name: &str) -> Option<UniformIndex> {
        self.uniform_location(name)
            .and_then(|location| self.uniform_index_at(location))
    }

    pub fn uniform_index_at(&self, location: UniformLocation) -> Option<UniformIndex> {
        self.table.borrow().index_at(location)
    }

    pub fn uniform_count(&self) -> usize {
        self.table.borrow().len()
    }

    /// Byte size of one value of the uniform at `index`.
    pub fn uniform_size(&self, index: UniformIndex) -> Option<usize> {
        self.with_descriptor(index, UniformDescriptor::byte_size)
    }

    pub fn uniform_type(&self, index: UniformIndex) -> Option<UniformType> {
        self.with_descriptor(index, |d| d.ty)
    }

    pub fn uniform_name(&self, index: UniformIndex) -> Option<String> {
        self.with_descriptor(index, |d| d.name.clone())
    }

    /// Whether a `T` may be stored in the uniform at `index`.
    ///
    /// Exact type match, or `i32` for any sampler. `false` for a stale index.
    pub fn validate_uniform<T: UniformValue>(&self, index: UniformIndex) -> bool {
        self.with_descriptor(index, |d| d.ty.accepts(T::UNIFORM_TYPE))
            .unwrap_or(false)
    }

    // ── typed get/set ─────────────────────────────────────────────────────

    /// Writes `value` to the uniform at `index` in the current program.
    ///
    /// Returns `false` and writes nothing if the index is stale or the type
    /// does not match.
    pub fn set_uniform<T: UniformValue>(&self, index: UniformIndex, value: &T) -> bool {
        if !self.validate_uniform::<T>(index) {
            self.report_mismatch::<T>(index);
            return false;
        }
        self.set_uniform_raw(index, bytemuck::cast_slice(std::slice::from_ref(value)))
    }

    /// [`set_uniform`](Self::set_uniform) by name. Unknown names are a no-op.
    pub fn set_uniform_named<T: UniformValue>(&self, name: &str, value: &T) -> bool {
        match self.uniform_index(name) {
            Some(index) => self.set_uniform(index, value),
            None => false,
        }
    }

    /// Reads the live value of the uniform at `index`.
    pub fn get_uniform<T: UniformValue>(&self, index: UniformIndex) -> Option<T> {
        if !self.validate_uniform::<T>(index) {
            self.report_mismatch::<T>(index);
            return None;
        }

        let mut value = T::zeroed();
        let program = self.program.get();
        let read = self.with_descriptor(index, |d| {
            d.read(
                self.backend.as_ref(),
                program,
                bytemuck::cast_slice_mut(std::slice::from_mut(&mut value)),
            )
        });
        read.map(|()| value)
    }

    /// Untyped write of already-validated words.
    pub(crate) fn set_uniform_raw(&self, index: UniformIndex, words: &[u32]) -> bool {
        self.with_descriptor(index, |d| {
            if words.len() != d.word_count() {
                return false;
            }
            d.write(self.backend.as_ref(), words);
            true
        })
        .unwrap_or(false)
    }

    // ── identity ──────────────────────────────────────────────────────────

    /// Bumped by every successful recompile. Indices from older generations
    /// no longer resolve.
    pub fn generation(&self) -> u32 {
        self.generation.get()
    }

    pub fn program(&self) -> ProgramId {
        self.program.get()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn backend(&self) -> &dyn ProgramBackend {
        self.backend.as_ref()
    }

    pub fn source_cache(&self) -> Option<&Rc<SourceCache>> {
        self.sources.as_ref()
    }

    fn with_descriptor<R>(&self, index: UniformIndex, f: impl FnOnce(&UniformDescriptor) -> R) -> Option<R> {
        self.table.borrow().get(index).map(f)
    }

    fn report_mismatch<T: UniformValue>(&self, index: UniformIndex) {
        if let Some((name, ty)) = self.with_descriptor(index, |d| (d.name.clone(), d.ty)) {
            log::warn!(
                "{}: uniform `{name}` is {ty:?}, not {:?}",
                self.label,
                T::UNIFORM_TYPE
            );
        }
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.backend.delete_program(self.program.get());
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("label", &self.label)
            .field("program", &self.program.get())
            .field("generation", &self.generation.get())
            .field("uniforms", &self.uniform_count())
            .finish()
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    std::fs::read_to_string(path).map_err(|source| {
        log::error!("can't read shader source {}: {source}", path.display());
        ShaderError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn build(
    backend: &dyn ProgramBackend,
    label: &str,
    vertex: &str,
    fragment: &str,
    sources: Option<&SourceCache>,
) -> Result<ProgramId, ShaderError> {
    match sources {
        Some(cache) => {
            let library = cache.library_source();
            let driver = cache.driver_source();
            compile_program(backend, label, &[vertex], &[&library, fragment, &driver])
        }
        None => compile_program(backend, label, &[vertex], &[fragment]),
    }
}
