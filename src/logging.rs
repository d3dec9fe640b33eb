//! Logging setup for host drivers.
//!
//! The runtime emits `tracing` events but never installs a subscriber itself. A host that
//! wants output calls [`init`] once:
//!
//! ```ignore
//! tickwork::logging::init();
//! tracing::info!("driver started");
//! ```
//!
//! Output is compact: `[LEVEL] message`, no timestamps, no module paths.

use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Initialize logging at INFO level.
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logging at `level`.
///
/// Does nothing if a global subscriber is already installed, so tests may call it freely.
pub fn init_with_level(level: LogLevel) {
    let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

    let layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_level(true)
        .with_ansi(false)
        .compact()
        .with_filter(filter);

    let _ = Registry::default().with(layer).try_init();
}
