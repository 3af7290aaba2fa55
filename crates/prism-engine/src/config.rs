//! Engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! shader_folder = "assets/shaders"
//! max_texture_units = 16
//! log_filter = "prism_engine=debug"
//!
//! [ray_marcher]
//! vertex = "raymarcher.vert"
//! library = "sdflibrary.glsl"
//! driver = "raymarcher.glsl"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Texture units available to a single material.
pub const DEFAULT_MAX_TEXTURE_UNITS: usize = 32;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Folder every relative shader path is resolved against.
    pub shader_folder: PathBuf,

    /// Upper bound on textures bound by one material.
    pub max_texture_units: usize,

    /// `env_logger` filter; `None` falls back to `RUST_LOG`.
    pub log_filter: Option<String>,

    pub ray_marcher: PipelineSources,
    pub ray_tracer: PipelineSources,
}

/// File names of the sources shared by every program of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSources {
    /// Vertex stage used by every program of this kind.
    pub vertex: PathBuf,
    /// Prepended to every fragment source.
    pub library: PathBuf,
    /// Appended to every fragment source; may reference library symbols.
    pub driver: PathBuf,
}

impl PipelineSources {
    pub fn ray_marcher() -> Self {
        Self {
            vertex: "raymarcher.vert".into(),
            library: "sdflibrary.glsl".into(),
            driver: "raymarcher.glsl".into(),
        }
    }

    pub fn ray_tracer() -> Self {
        Self {
            vertex: "raytracer.vert".into(),
            library: "library.glsl".into(),
            driver: "raytracer.glsl".into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shader_folder: PathBuf::from("shaders"),
            max_texture_units: DEFAULT_MAX_TEXTURE_UNITS,
            log_filter: None,
            ray_marcher: PipelineSources::ray_marcher(),
            ray_tracer: PipelineSources::ray_tracer(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Resolves `name` against the shader folder. Absolute paths pass through.
    pub fn shader_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.shader_folder.join(name)
    }

    /// Absolute-or-folder-relative paths for the ray-marcher's shared sources.
    pub fn ray_marcher_paths(&self) -> ResolvedSources {
        self.resolve(&self.ray_marcher)
    }

    /// Absolute-or-folder-relative paths for the ray-tracer's shared sources.
    pub fn ray_tracer_paths(&self) -> ResolvedSources {
        self.resolve(&self.ray_tracer)
    }

    fn resolve(&self, sources: &PipelineSources) -> ResolvedSources {
        ResolvedSources {
            vertex: self.shader_path(&sources.vertex),
            library: self.shader_path(&sources.library),
            driver: self.shader_path(&sources.driver),
        }
    }
}

/// [`PipelineSources`] joined with the shader folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSources {
    pub vertex: PathBuf,
    pub library: PathBuf,
    pub driver: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.max_texture_units, 32);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            shader_folder = "assets/glsl"
            max_texture_units = 8

            [ray_tracer]
            vertex = "rt.vert"
            library = "lib.glsl"
            driver = "rt.glsl"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.max_texture_units, 8);
        assert_eq!(cfg.ray_marcher, PipelineSources::ray_marcher());

        let rt = cfg.ray_tracer_paths();
        assert_eq!(rt.vertex, Path::new("assets/glsl/rt.vert"));
        assert_eq!(rt.library, Path::new("assets/glsl/lib.glsl"));
        assert_eq!(rt.driver, Path::new("assets/glsl/rt.glsl"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(EngineConfig::from_toml_str("shader_dir = \"x\"").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("here.toml"));
    }
}
