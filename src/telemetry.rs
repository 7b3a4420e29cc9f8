//! Log setup. Logs go to stderr so stdout carries only command output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter variable checked first; `RUST_LOG` is the fallback.
pub const LOG_ENV: &str = "GT_LOG";
/// Set to `json` for machine-readable log lines.
pub const LOG_FORMAT_ENV: &str = "GT_LOG_FORMAT";

const DEFAULT_FILTER: &str = "warn";

fn filter_directive(gt_log: Option<String>, rust_log: Option<String>) -> String {
    let set = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    set(gt_log)
        .or_else(|| set(rust_log))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init() {
    let directive = filter_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var("RUST_LOG").ok(),
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("subscriber already installed");
    }
}
