use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use tempfile::TempDir;

use crate::backend::HeadlessBackend;

/// Temporary shader folder.
pub struct ShaderDir {
    dir: TempDir,
}

impl ShaderDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp shader dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes (or overwrites) `name` and returns its full path.
    pub fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, text).expect("write shader file");
        path
    }
}

pub fn headless() -> Rc<HeadlessBackend> {
    Rc::new(HeadlessBackend::new())
}

pub const VERTEX: &str = "void main() { gl_Position = vec4(0.0); }\n";

// ── log capture ───────────────────────────────────────────────────────────

thread_local! {
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Records every log line on the emitting thread; each test runs on its own
/// thread, so captures do not mix.
struct CaptureLogger;

impl log::Log for CaptureLogger {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        CAPTURED.with(|c| c.borrow_mut().push((record.level(), record.args().to_string())));
    }

    fn flush(&self) {}
}

static CAPTURE: CaptureLogger = CaptureLogger;
static INSTALL: Once = Once::new();

/// Installs the capturing logger as the process logger. Must run before
/// anything else in the test binary installs one.
pub fn install_capture_logger() {
    INSTALL.call_once(|| {
        if log::set_logger(&CAPTURE).is_ok() {
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
}

/// Runs `f` and returns the log lines it emitted at `level`.
pub fn logged_at<R>(level: log::Level, f: impl FnOnce() -> R) -> (R, Vec<String>) {
    install_capture_logger();
    CAPTURED.with(|c| c.borrow_mut().clear());
    let out = f();
    let lines = CAPTURED
        .with(|c| c.take())
        .into_iter()
        .filter(|(l, _)| *l == level)
        .map(|(_, line)| line)
        .collect();
    (out, lines)
}
