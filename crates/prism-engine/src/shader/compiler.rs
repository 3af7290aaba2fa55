use crate::backend::{ProgramBackend, ProgramId, ShaderStage, StageId};
use crate::error::ShaderError;

/// Compiles both stages and links them into a new program.
///
/// Fragment sources are concatenated in the order given. Both stages are
/// always compiled so that both diagnostics reach the log in one pass; the
/// first failing stage is the one reported in the error. Transient stage
/// objects are released on every path.
pub fn compile_program(
    backend: &dyn ProgramBackend,
    label: &str,
    vertex_sources: &[&str],
    fragment_sources: &[&str],
) -> Result<ProgramId, ShaderError> {
    let vertex = compile_stage(backend, label, ShaderStage::Vertex, vertex_sources);
    let fragment = compile_stage(backend, label, ShaderStage::Fragment, fragment_sources);

    let result = match (&vertex, &fragment) {
        (Ok(v), Ok(f)) => backend.link_program(*v, *f).map_err(|log| {
            log::error!("{label}: link failed:\n{log}");
            ShaderError::LinkFailed {
                label: label.to_string(),
                log,
            }
        }),
        (Err(_), _) | (_, Err(_)) => Err(ShaderError::CompileFailed {
            label: label.to_string(),
            stage: if vertex.is_err() {
                ShaderStage::Vertex
            } else {
                ShaderStage::Fragment
            },
            log: [&vertex, &fragment]
                .into_iter()
                .filter_map(|r| r.as_ref().err().cloned())
                .collect::<Vec<_>>()
                .join("\n"),
        }),
    };

    for stage in [vertex, fragment].into_iter().flatten() {
        backend.delete_stage(stage);
    }

    if let Ok(program) = &result {
        log::debug!("{label}: linked program {:?}", program.0);
    }
    result
}

fn compile_stage(
    backend: &dyn ProgramBackend,
    label: &str,
    stage: ShaderStage,
    sources: &[&str],
) -> Result<StageId, String> {
    backend.compile_stage(stage, sources).inspect_err(|log| {
        log::error!("{label}: {stage} stage failed to compile:\n{log}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    const VERT: &str = "void main() {}\n";

    #[test]
    fn links_when_both_stages_compile() {
        let b = HeadlessBackend::new();
        let p = compile_program(&b, "ok", &[VERT], &["uniform float t;\n", "void main() { t; }\n"])
            .unwrap();

        assert_eq!(b.live_programs(), 1);
        assert_eq!(b.live_stages(), 0);
        assert!(b.uniform_location(p, "t").is_some());
    }

    #[test]
    fn fragment_failure_reports_stage_and_log() {
        let b = HeadlessBackend::new();
        let err = compile_program(&b, "bad", &[VERT], &["#error nope\n"]).unwrap_err();

        match &err {
            ShaderError::CompileFailed { label, stage, log } => {
                assert_eq!(label, "bad");
                assert_eq!(*stage, ShaderStage::Fragment);
                assert!(log.contains("nope"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(b.live_stages(), 0);
        assert_eq!(b.live_programs(), 0);
    }

    #[test]
    fn both_stage_logs_are_collected() {
        let b = HeadlessBackend::new();
        let err = compile_program(&b, "both", &["#error vertex side\n"], &["#error fragment side\n"])
            .unwrap_err();

        let log = err.diagnostics().unwrap();
        assert!(log.contains("vertex side"));
        assert!(log.contains("fragment side"));
        assert!(matches!(err, ShaderError::CompileFailed { stage: ShaderStage::Vertex, .. }));
    }

    #[test]
    fn link_failure_releases_stages() {
        let b = HeadlessBackend::new();
        let err = compile_program(
            &b,
            "clash",
            &["uniform float k;\nvoid main() { k; }\n"],
            &["uniform vec4 k;\nvoid main() { k; }\n"],
        )
        .unwrap_err();

        assert!(matches!(err, ShaderError::LinkFailed { .. }));
        assert_eq!(b.live_stages(), 0);
        assert_eq!(b.live_programs(), 0);
    }
}
