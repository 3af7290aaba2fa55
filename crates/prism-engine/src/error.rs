//! Error types.
//!
//! Everything here is recoverable: a failed reload keeps the last good program,
//! a missing property is a sentinel, not an error. Only construction-time
//! failures surface to the caller as hard errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::ShaderStage;

/// Failure while reading, compiling or linking a shader program.
#[derive(Debug, Error)]
pub enum ShaderError {
    /// A source file could not be read. Prior compiled state is retained.
    #[error("can't read shader source {}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage failed to compile. `log` holds the driver's diagnostic text.
    #[error("{label}: {stage} stage failed to compile")]
    CompileFailed {
        label: String,
        stage: ShaderStage,
        log: String,
    },

    /// Both stages compiled but the program failed to link.
    #[error("{label}: program failed to link")]
    LinkFailed { label: String, log: String },
}

impl ShaderError {
    /// Driver diagnostic text, if the failure came from the driver.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            ShaderError::SourceUnavailable { .. } => None,
            ShaderError::CompileFailed { log, .. } | ShaderError::LinkFailed { log, .. } => {
                Some(log)
            }
        }
    }
}

/// Failure of a material operation that is not expressible as a sentinel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MaterialError {
    #[error("can't bind texture for `{sampler}`: all {max} texture units are in use")]
    TextureUnitsExhausted { sampler: String, max: usize },
}

/// Failure while loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config")]
    Parse(#[from] toml::de::Error),
}
