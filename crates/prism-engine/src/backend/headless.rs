//! Software driver.
//!
//! `HeadlessBackend` implements [`ProgramBackend`] without a GPU. It is meant
//! for tests and offline tools, and reproduces the parts of driver behavior the
//! engine depends on:
//! - stages "compile" by scanning `uniform <type> <name>;` declarations
//!   (optionally prefixed with `layout(location = N)`)
//! - a declared uniform is active only if its name is referenced again in the
//!   same stage, like a real compiler eliminating dead uniforms
//! - a `#error` line fails compilation, conflicting declarations fail linking
//! - locations are assigned explicit-first, then lowest free
//! - uniform values are stored per program and can be read back
//!
//! Every state-changing call is appended to an event trace so tests can assert
//! on ordering.

use std::cell::RefCell;
use std::num::NonZeroU32;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::{
    ActiveUniform, ProgramBackend, ProgramId, ShaderStage, StageId, TextureId, UniformLocation,
};
use crate::render::Drawable;

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    UseProgram(ProgramId),
    SetUniform {
        program: Option<ProgramId>,
        location: UniformLocation,
        words: Vec<u32>,
    },
    BindTexture {
        unit: u32,
        texture: TextureId,
    },
    Draw {
        label: String,
    },
}

#[derive(Debug, Clone)]
struct Declaration {
    name: String,
    gl_type: u32,
    array_len: u32,
    location: Option<u32>,
}

#[derive(Debug)]
struct CompiledStage {
    uniforms: Vec<Declaration>,
}

#[derive(Debug)]
struct LinkedUniform {
    name: String,
    gl_type: u32,
    array_len: u32,
    location: u32,
}

#[derive(Debug, Default)]
struct LinkedProgram {
    uniforms: Vec<LinkedUniform>,
    values: FxHashMap<u32, Vec<u32>>,
}

impl LinkedProgram {
    fn has_location(&self, location: u32) -> bool {
        self.uniforms
            .iter()
            .any(|u| (u.location..u.location + u.array_len).contains(&location))
    }
}

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    stages: FxHashMap<NonZeroU32, CompiledStage>,
    programs: FxHashMap<NonZeroU32, LinkedProgram>,
    current: Option<ProgramId>,
    aliases: FxHashMap<String, String>,
    trace: Vec<BackendEvent>,
    stages_compiled: usize,
    programs_linked: usize,
}

impl State {
    fn allocate(&mut self) -> NonZeroU32 {
        self.next_handle += 1;
        NonZeroU32::new(self.next_handle).unwrap_or(NonZeroU32::MIN)
    }
}

/// In-memory driver. See the module docs for the emulated behavior.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: RefCell<State>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `alias` resolve to the same location as `target` in every program.
    ///
    /// Real drivers never do this; it exists so the material layer's
    /// location-keyed deduplication can be exercised.
    pub fn alias_uniform(&self, alias: impl Into<String>, target: impl Into<String>) {
        self.state
            .borrow_mut()
            .aliases
            .insert(alias.into(), target.into());
    }

    /// Number of successful stage compilations so far.
    pub fn stages_compiled(&self) -> usize {
        self.state.borrow().stages_compiled
    }

    /// Number of successful program links so far.
    pub fn programs_linked(&self) -> usize {
        self.state.borrow().programs_linked
    }

    /// Stage objects not yet deleted.
    pub fn live_stages(&self) -> usize {
        self.state.borrow().stages.len()
    }

    /// Program objects not yet deleted.
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.state.borrow().current
    }

    /// Words last written to `location` of `program`.
    pub fn uniform_words(&self, program: ProgramId, location: UniformLocation) -> Option<Vec<u32>> {
        self.state
            .borrow()
            .programs
            .get(&program.0)
            .and_then(|p| p.values.get(&location.0).cloned())
    }

    /// Records a draw call. Used by [`HeadlessMesh`] and by tools.
    pub fn record_draw(&self, label: impl Into<String>) {
        self.state
            .borrow_mut()
            .trace
            .push(BackendEvent::Draw { label: label.into() });
    }

    pub fn trace(&self) -> Vec<BackendEvent> {
        self.state.borrow().trace.clone()
    }

    pub fn take_trace(&self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.state.borrow_mut().trace)
    }

    fn write_uniform(&self, location: UniformLocation, words: Vec<u32>) {
        let mut guard = self.state.borrow_mut();
        let st = &mut *guard;
        let program = st.current;

        if let Some(linked) = program.and_then(|p| st.programs.get_mut(&p.0)) {
            if linked.has_location(location.0) {
                linked.values.insert(location.0, words.clone());
            }
        }

        st.trace.push(BackendEvent::SetUniform {
            program,
            location,
            words,
        });
    }

    fn read_uniform(&self, program: ProgramId, location: UniformLocation, out: &mut [u32]) {
        out.fill(0);
        let st = self.state.borrow();
        let stored = st
            .programs
            .get(&program.0)
            .and_then(|p| p.values.get(&location.0));

        if let Some(words) = stored {
            let n = words.len().min(out.len());
            out[..n].copy_from_slice(&words[..n]);
        }
    }
}

impl ProgramBackend for HeadlessBackend {
    fn compile_stage(&self, stage: ShaderStage, sources: &[&str]) -> Result<StageId, String> {
        let source = sources.concat();
        let uniforms = scan_stage(&source)?;

        log::trace!("headless: {stage} stage has {} active uniforms", uniforms.len());

        let mut st = self.state.borrow_mut();
        let handle = st.allocate();
        st.stages.insert(handle, CompiledStage { uniforms });
        st.stages_compiled += 1;
        Ok(StageId(handle))
    }

    fn delete_stage(&self, stage: StageId) {
        self.state.borrow_mut().stages.remove(&stage.0);
    }

    fn link_program(&self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        let mut st = self.state.borrow_mut();

        let uniforms = {
            let (Some(v), Some(f)) = (st.stages.get(&vertex.0), st.stages.get(&fragment.0)) else {
                return Err("error: attached stage object does not exist".to_string());
            };
            link_uniforms(v, f)?
        };

        let handle = st.allocate();
        st.programs.insert(
            handle,
            LinkedProgram {
                uniforms,
                values: FxHashMap::default(),
            },
        );
        st.programs_linked += 1;
        Ok(ProgramId(handle))
    }

    fn delete_program(&self, program: ProgramId) {
        let mut st = self.state.borrow_mut();
        st.programs.remove(&program.0);
        if st.current == Some(program) {
            st.current = None;
        }
    }

    fn use_program(&self, program: ProgramId) {
        let mut st = self.state.borrow_mut();
        st.current = Some(program);
        st.trace.push(BackendEvent::UseProgram(program));
    }

    fn active_uniforms(&self, program: ProgramId) -> Vec<ActiveUniform> {
        let st = self.state.borrow();
        st.programs
            .get(&program.0)
            .map(|p| {
                p.uniforms
                    .iter()
                    .map(|u| ActiveUniform {
                        name: u.name.clone(),
                        gl_type: u.gl_type,
                        array_len: u.array_len,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let st = self.state.borrow();
        let name = st.aliases.get(name).map_or(name, String::as_str);
        st.programs
            .get(&program.0)?
            .uniforms
            .iter()
            .find(|u| u.name == name)
            .map(|u| UniformLocation(u.location))
    }

    fn set_uniform_f32(&self, location: UniformLocation, _width: usize, values: &[f32]) {
        self.write_uniform(location, bytemuck::cast_slice(values).to_vec());
    }

    fn set_uniform_i32(&self, location: UniformLocation, _width: usize, values: &[i32]) {
        self.write_uniform(location, bytemuck::cast_slice(values).to_vec());
    }

    fn set_uniform_u32(&self, location: UniformLocation, _width: usize, values: &[u32]) {
        self.write_uniform(location, values.to_vec());
    }

    fn set_uniform_matrix(&self, location: UniformLocation, _columns: usize, _rows: usize, values: &[f32]) {
        self.write_uniform(location, bytemuck::cast_slice(values).to_vec());
    }

    fn get_uniform_f32(&self, program: ProgramId, location: UniformLocation, out: &mut [f32]) {
        self.read_uniform(program, location, bytemuck::cast_slice_mut(out));
    }

    fn get_uniform_i32(&self, program: ProgramId, location: UniformLocation, out: &mut [i32]) {
        self.read_uniform(program, location, bytemuck::cast_slice_mut(out));
    }

    fn get_uniform_u32(&self, program: ProgramId, location: UniformLocation, out: &mut [u32]) {
        self.read_uniform(program, location, out);
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) {
        self.state
            .borrow_mut()
            .trace
            .push(BackendEvent::BindTexture { unit, texture });
    }
}

/// Geometry stand-in that records a draw event on the headless driver.
pub struct HeadlessMesh {
    backend: Rc<HeadlessBackend>,
    label: String,
    world_space: bool,
}

impl HeadlessMesh {
    /// A mesh positioned by its model matrix.
    pub fn world(backend: Rc<HeadlessBackend>, label: impl Into<String>) -> Self {
        Self {
            backend,
            label: label.into(),
            world_space: true,
        }
    }

    /// A screen-space pass (full-screen quad).
    pub fn screen(backend: Rc<HeadlessBackend>, label: impl Into<String>) -> Self {
        Self {
            backend,
            label: label.into(),
            world_space: false,
        }
    }
}

impl Drawable for HeadlessMesh {
    fn draw(&self) {
        self.backend.record_draw(self.label.clone());
    }

    fn is_world_space(&self) -> bool {
        self.world_space
    }
}

// ── source scanning ───────────────────────────────────────────────────────

fn scan_stage(source: &str) -> Result<Vec<Declaration>, String> {
    let mut active = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if let Some(message) = line.strip_prefix("#error") {
            return Err(format!("0:{line_no}: error: {}", message.trim()));
        }

        let (location, rest) = strip_layout(line);
        let Some(rest) = rest.strip_prefix("uniform ") else {
            continue;
        };

        let Some((decl, _)) = rest.split_once(';') else {
            return Err(format!("0:{line_no}: error: expected ';' after uniform declaration"));
        };
        let decl = decl.split_once('=').map_or(decl, |(lhs, _)| lhs);

        let mut tokens = decl.split_whitespace();
        let (Some(type_name), Some(name), None) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(format!("0:{line_no}: error: malformed uniform declaration"));
        };

        let gl_type = glsl_type(type_name)
            .ok_or_else(|| format!("0:{line_no}: error: '{type_name}' : unknown uniform type"))?;

        let (name, array_len) = match name.split_once('[') {
            Some((base, len)) => {
                let len = len
                    .trim_end_matches(']')
                    .parse::<u32>()
                    .map_err(|_| format!("0:{line_no}: error: bad array size for '{base}'"))?;
                (base, len.max(1))
            }
            None => (name, 1),
        };

        // The declaration itself is one occurrence.
        if count_word(source, name) < 2 {
            continue;
        }

        active.push(Declaration {
            name: name.to_string(),
            gl_type,
            array_len,
            location,
        });
    }

    Ok(active)
}

fn strip_layout(line: &str) -> (Option<u32>, &str) {
    let Some(rest) = line.strip_prefix("layout") else {
        return (None, line);
    };
    let Some((qualifiers, after)) = rest.trim_start().strip_prefix('(').and_then(|r| r.split_once(')'))
    else {
        return (None, line);
    };

    let location = qualifiers.split(',').find_map(|q| {
        let (key, value) = q.split_once('=')?;
        if key.trim() == "location" {
            value.trim().parse().ok()
        } else {
            None
        }
    });

    (location, after.trim_start())
}

fn count_word(source: &str, word: &str) -> usize {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';

    source
        .match_indices(word)
        .filter(|(at, _)| {
            let before = source[..*at].chars().next_back();
            let after = source[at + word.len()..].chars().next();
            !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
        })
        .count()
}

fn glsl_type(name: &str) -> Option<u32> {
    let ty = match name {
        "float" => glow::FLOAT,
        "vec2" => glow::FLOAT_VEC2,
        "vec3" => glow::FLOAT_VEC3,
        "vec4" => glow::FLOAT_VEC4,
        "int" => glow::INT,
        "ivec2" => glow::INT_VEC2,
        "ivec3" => glow::INT_VEC3,
        "ivec4" => glow::INT_VEC4,
        "uint" => glow::UNSIGNED_INT,
        "uvec2" => glow::UNSIGNED_INT_VEC2,
        "uvec3" => glow::UNSIGNED_INT_VEC3,
        "uvec4" => glow::UNSIGNED_INT_VEC4,
        "bool" => glow::BOOL,
        "mat2" | "mat2x2" => glow::FLOAT_MAT2,
        "mat2x3" => glow::FLOAT_MAT2x3,
        "mat2x4" => glow::FLOAT_MAT2x4,
        "mat3" | "mat3x3" => glow::FLOAT_MAT3,
        "mat3x2" => glow::FLOAT_MAT3x2,
        "mat3x4" => glow::FLOAT_MAT3x4,
        "mat4" | "mat4x4" => glow::FLOAT_MAT4,
        "mat4x2" => glow::FLOAT_MAT4x2,
        "mat4x3" => glow::FLOAT_MAT4x3,
        "sampler1D" => glow::SAMPLER_1D,
        "sampler2D" => glow::SAMPLER_2D,
        "sampler3D" => glow::SAMPLER_3D,
        "samplerCube" => glow::SAMPLER_CUBE,
        "sampler2DShadow" => glow::SAMPLER_2D_SHADOW,
        _ => return None,
    };
    Some(ty)
}

fn link_uniforms(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<Vec<LinkedUniform>, String> {
    let mut merged: Vec<Declaration> = Vec::new();

    for decl in vertex.uniforms.iter().chain(&fragment.uniforms) {
        match merged.iter_mut().find(|d| d.name == decl.name) {
            Some(existing) => {
                if existing.gl_type != decl.gl_type || existing.array_len != decl.array_len {
                    return Err(format!(
                        "error: uniform '{}' declared with different types across stages",
                        decl.name
                    ));
                }
                match (existing.location, decl.location) {
                    (None, loc) => existing.location = loc,
                    (Some(a), Some(b)) if a != b => {
                        return Err(format!(
                            "error: uniform '{}' has conflicting explicit locations",
                            decl.name
                        ));
                    }
                    _ => {}
                }
            }
            None => merged.push(decl.clone()),
        }
    }

    let mut taken = FxHashSet::default();
    for decl in &merged {
        if let Some(loc) = decl.location {
            for slot in loc..slot_end(loc, decl.array_len)? {
                if !taken.insert(slot) {
                    return Err(format!("error: location {slot} is assigned to more than one uniform"));
                }
            }
        }
    }

    let mut next = 0u32;
    let mut linked = Vec::with_capacity(merged.len());
    for decl in merged {
        let location = match decl.location {
            Some(loc) => loc,
            None => {
                while (next..slot_end(next, decl.array_len)?).any(|slot| taken.contains(&slot)) {
                    next = slot_end(next, 1)?;
                }
                taken.extend(next..slot_end(next, decl.array_len)?);
                next
            }
        };
        linked.push(LinkedUniform {
            name: decl.name,
            gl_type: decl.gl_type,
            array_len: decl.array_len,
            location,
        });
    }

    Ok(linked)
}

fn slot_end(first: u32, count: u32) -> Result<u32, String> {
    first
        .checked_add(count)
        .ok_or_else(|| "error: location out of range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERT: &str = "void main() { gl_Position = vec4(0.0); }\n";

    fn link(backend: &HeadlessBackend, fragment: &str) -> Result<ProgramId, String> {
        let v = backend.compile_stage(ShaderStage::Vertex, &[VERT])?;
        let f = backend.compile_stage(ShaderStage::Fragment, &[fragment])?;
        let program = backend.link_program(v, f);
        backend.delete_stage(v);
        backend.delete_stage(f);
        program
    }

    // ── compile ───────────────────────────────────────────────────────────

    #[test]
    fn unreferenced_uniform_is_not_active() {
        let b = HeadlessBackend::new();
        let p = link(
            &b,
            "uniform vec3 used;\nuniform float unused;\nvoid main() { color = used; }\n",
        )
        .unwrap();

        let names: Vec<_> = b.active_uniforms(p).into_iter().map(|u| u.name).collect();
        assert_eq!(names, ["used"]);
        assert!(b.uniform_location(p, "unused").is_none());
    }

    #[test]
    fn error_directive_fails_compile_with_line() {
        let b = HeadlessBackend::new();
        let err = b
            .compile_stage(ShaderStage::Fragment, &["void main() {}\n", "#error broken\n"])
            .unwrap_err();
        assert_eq!(err, "0:2: error: broken");
        assert_eq!(b.live_stages(), 0);
    }

    #[test]
    fn unknown_type_fails_compile() {
        let b = HeadlessBackend::new();
        let err = b
            .compile_stage(ShaderStage::Fragment, &["uniform quat q;\nvoid main() { q; }\n"])
            .unwrap_err();
        assert!(err.contains("unknown uniform type"));
    }

    #[test]
    fn word_match_ignores_longer_identifiers() {
        assert_eq!(count_word("uniform float t; float tt = t2;", "t"), 1);
        assert_eq!(count_word("uniform float t; x = t * 2.0;", "t"), 2);
    }

    // ── link ──────────────────────────────────────────────────────────────

    #[test]
    fn explicit_locations_are_kept_and_others_fill_gaps() {
        let b = HeadlessBackend::new();
        let p = link(
            &b,
            "uniform float a;\nlayout(location = 0) uniform vec3 b;\nuniform float c;\n\
             void main() { a; b; c; }\n",
        )
        .unwrap();

        assert_eq!(b.uniform_location(p, "b"), Some(UniformLocation(0)));
        assert_eq!(b.uniform_location(p, "a"), Some(UniformLocation(1)));
        assert_eq!(b.uniform_location(p, "c"), Some(UniformLocation(2)));
    }

    #[test]
    fn conflicting_types_fail_link_without_leaking() {
        let b = HeadlessBackend::new();
        let v = b
            .compile_stage(ShaderStage::Vertex, &["uniform float k;\nvoid main() { k; }\n"])
            .unwrap();
        let f = b
            .compile_stage(ShaderStage::Fragment, &["uniform vec2 k;\nvoid main() { k; }\n"])
            .unwrap();

        assert!(b.link_program(v, f).is_err());
        assert_eq!(b.live_programs(), 0);
        assert_eq!(b.programs_linked(), 0);
    }

    #[test]
    fn location_past_the_last_slot_fails_link() {
        let b = HeadlessBackend::new();
        let err = link(&b, "layout(location = 4294967295) uniform float x;\nvoid main() { x; }\n").unwrap_err();

        assert!(err.contains("location out of range"), "{err}");
        assert_eq!(b.live_programs(), 0);
    }

    #[test]
    fn aliases_resolve_to_target_location() {
        let b = HeadlessBackend::new();
        let p = link(&b, "uniform vec4 tint;\nvoid main() { tint; }\n").unwrap();
        b.alias_uniform("color", "tint");
        assert_eq!(b.uniform_location(p, "color"), b.uniform_location(p, "tint"));
    }

    // ── values ────────────────────────────────────────────────────────────

    #[test]
    fn writes_go_to_current_program_and_read_back() {
        let b = HeadlessBackend::new();
        let p = link(&b, "uniform vec2 offset;\nvoid main() { offset; }\n").unwrap();
        let loc = b.uniform_location(p, "offset").unwrap();

        b.use_program(p);
        b.set_uniform_f32(loc, 2, &[0.5, -1.0]);

        let mut out = [0.0f32; 2];
        b.get_uniform_f32(p, loc, &mut out);
        assert_eq!(out, [0.5, -1.0]);

        let trace = b.trace();
        assert_eq!(trace[0], BackendEvent::UseProgram(p));
        assert!(matches!(trace[1], BackendEvent::SetUniform { program: Some(q), .. } if q == p));
    }

    #[test]
    fn write_to_unknown_location_is_ignored() {
        let b = HeadlessBackend::new();
        let p = link(&b, "uniform float x;\nvoid main() { x; }\n").unwrap();
        b.use_program(p);
        b.set_uniform_f32(UniformLocation(9), 1, &[1.0]);
        assert!(b.uniform_words(p, UniformLocation(9)).is_none());
    }
}
