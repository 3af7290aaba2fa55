use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "prism_engine=debug"). When absent, `RUST_LOG` is consulted, then the
/// default level applies.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub default_level: log::LevelFilter,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            default_level: log::LevelFilter::Info,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// Builds a config from an optional filter string, e.g. the `log_filter`
    /// entry of [`EngineConfig`](crate::config::EngineConfig).
    pub fn with_filter(filter: Option<&str>) -> Self {
        Self {
            env_filter: filter.map(str::to_owned),
            ..Self::default()
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Subsequent calls are ignored, so tools and tests may call it freely.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        match config.env_filter {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => match std::env::var("RUST_LOG") {
                Ok(filter) => {
                    builder.parse_filters(&filter);
                }
                Err(_) => {
                    builder.filter_level(config.default_level);
                }
            },
        }

        builder.write_style(config.write_style);

        // Shader compile logs are multi-line; keep the module path so the
        // operator can tell the compiler apart from the material layer.
        builder.format_module_path(true);

        if builder.try_init().is_err() {
            // Another logger was installed by the host application.
            return;
        }

        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_filter_keeps_defaults() {
        let cfg = LoggingConfig::with_filter(Some("prism_engine=debug"));
        assert_eq!(cfg.env_filter.as_deref(), Some("prism_engine=debug"));
        assert_eq!(cfg.default_level, log::LevelFilter::Info);
    }

    #[test]
    fn init_is_idempotent() {
        // Tests share one process logger; keep the capturing one in place.
        crate::test_support::install_capture_logger();
        init_logging(LoggingConfig::default());
        init_logging(LoggingConfig::with_filter(Some("warn")));
    }
}
