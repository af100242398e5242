//! Logging setup and event macros.
//!
//! Compact timestamped output with per-module levels taken from
//! `[logging]` in `settings.toml`:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "tailwatch::watcher" = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over config:
//! ```bash
//! RUST_LOG=debug tailwatch watch /var/log/app.log
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build an `EnvFilter` directive string from config.
///
/// `default_override` replaces `config.default` (used by `--verbose`);
/// per-module levels are always appended.
pub fn filter_directives(config: &LoggingConfig, default_override: Option<&str>) -> String {
    let mut directives = default_override.unwrap_or(&config.default).to_string();

    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push_str(&format!(",{module}={level}"));
    }
    directives
}

/// Initialize logging. Only the first call takes effect.
///
/// Output goes to stderr so stdout stays free for change lines.
pub fn init_with_config(config: &LoggingConfig, default_override: Option<&str>) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config, default_override))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with `LoggingConfig::default()` (quiet, `warn`).
pub fn init() {
    init_with_config(&LoggingConfig::default(), None);
}

/// Info-level `[component] event: detail` line.
///
/// ```ignore
/// crate::log_event!("watcher", "watching", "{} from offset {start_offset}", path.display());
/// crate::log_event!("cli", "waiting for new file", "{}", path.display());
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level variant, used for per-transition lines.
///
/// ```ignore
/// crate::debug_event!("watcher", "truncated", "{}", path.display());
/// crate::debug_event!("registry", "closed");
/// ```
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(filter_directives(&LoggingConfig::default(), None), "warn");
    }

    #[test]
    fn test_module_directives_sorted() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("tailwatch::watcher".to_string(), "trace".to_string());
        config
            .modules
            .insert("notify".to_string(), "info".to_string());

        assert_eq!(
            filter_directives(&config, Some("debug")),
            "debug,notify=info,tailwatch::watcher=trace"
        );
    }

    #[test]
    fn test_directives_parse() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("tailwatch".to_string(), "debug".to_string());
        assert!(EnvFilter::try_new(filter_directives(&config, None)).is_ok());
    }

    #[test]
    fn test_event_macros_expand() {
        let path = std::path::Path::new("/var/log/app.log");
        let start_offset = 42u64;
        crate::log_event!("watcher", "watching", "{} from offset {start_offset}", path.display());
        crate::log_event!("registry", "closed");
        crate::debug_event!("watcher", "truncated", "{}", path.display());
        crate::debug_event!("cli", "interrupted");
    }
}
