//! Logging setup
//!
//! Human-readable compact output by default, JSON lines when running under
//! a supervisor that ships logs elsewhere. `RUST_LOG` always wins over the
//! configured level.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,

    /// Emit JSON lines instead of compact text
    pub json: bool,

    /// Include thread IDs
    pub thread_ids: bool,

    /// Colourise output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            thread_ids: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(json) = std::env::var("CREATUNE_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.ansi = false;
        }

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    if config.json {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_thread_ids(config.thread_ids)
                .with_target(true),
        );
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(config.ansi)
                .with_thread_ids(config.thread_ids)
                .with_target(true),
        );
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
