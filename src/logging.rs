//! Logging setup for both processes.
//!
//! Compact timestamped tracing output with per-module level configuration.
//! `RUST_LOG` always wins over the config file.
//!
//! ```toml
//! [logging]
//! default = "info"
//!
//! [logging.modules]
//! ingest = "debug"
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm, local time.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize tracing once. Later calls are no-ops, so every entry point can
/// call this unconditionally.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let mut filter_str = config.default.clone();
            for (module, level) in &config.modules {
                filter_str.push_str(&format!(",{module}={level}"));
            }
            EnvFilter::new(&filter_str)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize with defaults (`default = "info"`).
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Log a subsystem event at info level.
///
/// ```ignore
/// log_event!("pipeline", "pass B complete", "{} files", n);
/// ```
#[macro_export]
macro_rules! log_event {
    ($subsystem:expr, $event:expr) => {
        tracing::info!("[{}] {}", $subsystem, $event)
    };
    ($subsystem:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $subsystem, $event, format!($($arg)*))
    };
}

/// Debug-only subsystem event.
#[macro_export]
macro_rules! debug_event {
    ($subsystem:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $subsystem, $event)
    };
    ($subsystem:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $subsystem, $event, format!($($arg)*))
    };
}
