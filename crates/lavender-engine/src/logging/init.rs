use std::sync::Once;

/// Crates that are chatty at `info` and only interesting when they warn.
const QUIET_CRATES: &[&str] = &["wgpu_core", "wgpu_hal", "naga"];

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "lavender_engine=debug,wgpu_core=warn"). When unset, `RUST_LOG` is used,
/// then `default_level` with the GPU stack held at `warn`.
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

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Subsequent calls are ignored. Call early in `main`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        match config.env_filter.or_else(|| std::env::var("RUST_LOG").ok()) {
            Some(filter) => {
                builder.parse_filters(&filter);
            }
            None => {
                builder.filter_level(config.default_level);
                for name in QUIET_CRATES {
                    builder.filter_module(name, log::LevelFilter::Warn);
                }
            }
        }

        builder.write_style(config.write_style);
        builder.format_timestamp_millis();

        // A test harness or host application may already own the logger.
        if builder.try_init().is_err() {
            return;
        }

        log::debug!("logging initialized");
    });
}
