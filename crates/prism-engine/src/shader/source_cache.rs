//! Shared shader sources.
//!
//! Every program of one kind (all ray-marched objects, say) is compiled as
//! `library + own fragment + driver`. A [`SourceCache`] holds the library and
//! driver text, tracks their content hashes, and raises a dirty flag when a
//! refresh finds different content. Dependent shaders consult the flag in
//! [`Shader::reload`](super::Shader::reload), so a refresh must happen before
//! any of them reloads; [`reload_shaders`] performs the whole pass in that
//! order.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use xxhash_rust::xxh3::xxh3_64;

use super::Shader;
use super::program::ReloadOutcome;

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    text: Rc<str>,
    hash: u64,
}

impl Entry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            text: Rc::from(""),
            hash: xxh3_64(b""),
        }
    }

    /// Re-reads the file. Returns whether the content hash changed. A read
    /// failure keeps the previous text.
    fn refresh(&mut self) -> bool {
        let before = self.hash;
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                self.hash = xxh3_64(text.as_bytes());
                self.text = Rc::from(text);
            }
            Err(e) => {
                log::error!("can't read shared shader source {}: {e}", self.path.display());
            }
        }
        before != self.hash
    }
}

/// Library and driver sources shared by a family of shaders.
#[derive(Debug)]
pub struct SourceCache {
    library: RefCell<Entry>,
    driver: RefCell<Entry>,
    loaded: Cell<bool>,
    dirty: Cell<bool>,
}

impl SourceCache {
    /// Creates an empty cache. Nothing is read until the first access or
    /// [`reload_source`](Self::reload_source).
    pub fn new(library: impl Into<PathBuf>, driver: impl Into<PathBuf>) -> Self {
        Self {
            library: RefCell::new(Entry::new(library.into())),
            driver: RefCell::new(Entry::new(driver.into())),
            loaded: Cell::new(false),
            dirty: Cell::new(false),
        }
    }

    /// Re-reads both files and returns whether either changed.
    ///
    /// A change raises the dirty flag; it stays raised until
    /// [`clear_dirty`](Self::clear_dirty). The very first population is not
    /// a change: no shader has been compiled against older text yet.
    pub fn reload_source(&self) -> bool {
        let library_changed = self.library.borrow_mut().refresh();
        let driver_changed = self.driver.borrow_mut().refresh();
        let changed = library_changed || driver_changed;

        if self.loaded.replace(true) && changed {
            log::info!("shared shader sources changed");
            self.dirty.set(true);
        }
        changed
    }

    /// Text prepended to every dependent fragment stage.
    pub fn library_source(&self) -> Rc<str> {
        self.ensure_loaded();
        Rc::clone(&self.library.borrow().text)
    }

    /// Text appended to every dependent fragment stage.
    pub fn driver_source(&self) -> Rc<str> {
        self.ensure_loaded();
        Rc::clone(&self.driver.borrow().text)
    }

    pub fn library_path(&self) -> PathBuf {
        self.library.borrow().path.clone()
    }

    pub fn driver_path(&self) -> PathBuf {
        self.driver.borrow().path.clone()
    }

    /// Whether a refresh found new content that dependents have not yet been
    /// reloaded against.
    pub fn has_source_changed(&self) -> bool {
        self.dirty.get()
    }

    pub fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    fn ensure_loaded(&self) {
        if !self.loaded.get() {
            self.reload_source();
        }
    }
}

/// Result of one [`reload_shaders`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub recompiled: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Refreshes `cache`, then reloads every distinct shader once, then clears the
/// dirty flag.
///
/// Shaders are deduplicated by identity and reloaded in first-seen order.
/// Failures are logged and counted; a failed shader keeps its last good
/// program.
pub fn reload_shaders<'a, I>(cache: &SourceCache, shaders: I) -> ReloadReport
where
    I: IntoIterator<Item = &'a Rc<Shader>>,
{
    cache.reload_source();

    let mut seen: Vec<&Rc<Shader>> = Vec::new();
    for shader in shaders {
        if !seen.iter().any(|s| Rc::ptr_eq(s, shader)) {
            seen.push(shader);
        }
    }

    let mut report = ReloadReport::default();
    for shader in seen {
        match shader.reload() {
            Ok(ReloadOutcome::Recompiled) => report.recompiled += 1,
            Ok(ReloadOutcome::Unchanged) => report.unchanged += 1,
            Err(e) => {
                log::warn!("{e}; keeping the last good program");
                report.failed += 1;
            }
        }
    }

    cache.clear_dirty();
    log::debug!(
        "reload pass: {} recompiled, {} unchanged, {} failed",
        report.recompiled,
        report.unchanged,
        report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::test_support::{ShaderDir, VERTEX, headless};

    fn cache(dir: &ShaderDir) -> SourceCache {
        dir.write("lib.glsl", "float lib();\n");
        dir.write("drv.glsl", "void main() {}\n");
        SourceCache::new(dir.path("lib.glsl"), dir.path("drv.glsl"))
    }

    #[test]
    fn accessors_load_lazily() {
        let dir = ShaderDir::new();
        let cache = cache(&dir);

        assert_eq!(&*cache.library_source(), "float lib();\n");
        assert_eq!(&*cache.driver_source(), "void main() {}\n");
        assert!(!cache.has_source_changed());
    }

    #[test]
    fn change_raises_flag_until_cleared() {
        let dir = ShaderDir::new();
        let cache = cache(&dir);
        cache.library_source();

        assert!(!cache.reload_source());
        assert!(!cache.has_source_changed());

        dir.write("drv.glsl", "void main() { discard; }\n");
        assert!(cache.reload_source());
        assert!(cache.has_source_changed());

        // A quiet refresh does not lower it.
        assert!(!cache.reload_source());
        assert!(cache.has_source_changed());

        cache.clear_dirty();
        assert!(!cache.has_source_changed());
    }

    #[test]
    fn unreadable_file_keeps_previous_text() {
        let dir = ShaderDir::new();
        let cache = cache(&dir);
        cache.library_source();

        std::fs::remove_file(dir.path("lib.glsl")).unwrap();
        assert!(!cache.reload_source());
        assert_eq!(&*cache.library_source(), "float lib();\n");
    }

    // ── reload pass ───────────────────────────────────────────────────────

    fn shader(dir: &ShaderDir, backend: &Rc<HeadlessBackend>, cache: &Rc<SourceCache>, name: &str) -> Rc<Shader> {
        let v = dir.write("obj.vert", VERTEX);
        let f = dir.write(name, "void shade() {}\n");
        Rc::new(Shader::load(backend.clone(), v, f, Some(cache.clone())).unwrap())
    }

    #[test]
    fn shared_change_recompiles_every_dependent() {
        let dir = ShaderDir::new();
        let b = headless();
        let cache = Rc::new(cache(&dir));
        let a = shader(&dir, &b, &cache, "a.frag");
        let c = shader(&dir, &b, &cache, "c.frag");
        assert_eq!(b.programs_linked(), 2);

        dir.write("lib.glsl", "float lib();\nfloat lib2();\n");
        let report = reload_shaders(&cache, [&a, &c]);

        assert_eq!(report.recompiled, 2);
        assert_eq!(b.programs_linked(), 4);
        assert!(!cache.has_source_changed());
    }

    #[test]
    fn quiet_pass_recompiles_nothing() {
        let dir = ShaderDir::new();
        let b = headless();
        let cache = Rc::new(cache(&dir));
        let a = shader(&dir, &b, &cache, "a.frag");

        let report = reload_shaders(&cache, [&a]);
        assert_eq!(report, ReloadReport { recompiled: 0, unchanged: 1, failed: 0 });
        assert_eq!(b.programs_linked(), 1);
    }

    #[test]
    fn shared_shader_reloads_once() {
        let dir = ShaderDir::new();
        let b = headless();
        let cache = Rc::new(cache(&dir));
        let a = shader(&dir, &b, &cache, "a.frag");

        dir.write("drv.glsl", "void main() { shade(); }\n");
        let report = reload_shaders(&cache, [&a, &a, &a]);

        assert_eq!(report.recompiled, 1);
        assert_eq!(report.unchanged, 0);
        assert_eq!(b.programs_linked(), 2);
    }

    #[test]
    fn broken_shared_source_is_counted_and_cleared() {
        let dir = ShaderDir::new();
        let b = headless();
        let cache = Rc::new(cache(&dir));
        let a = shader(&dir, &b, &cache, "a.frag");
        let program = a.program();

        dir.write("lib.glsl", "#error library broke\n");
        let report = reload_shaders(&cache, [&a]);

        assert_eq!(report.failed, 1);
        assert_eq!(a.program(), program);
        assert!(!cache.has_source_changed());
    }

    #[test]
    fn missing_files_on_first_access_yield_empty_text() {
        let dir = ShaderDir::new();
        let cache = SourceCache::new(dir.path("nope.glsl"), dir.path("nada.glsl"));
        assert_eq!(&*cache.library_source(), "");
        assert!(!cache.has_source_changed());
    }
}
