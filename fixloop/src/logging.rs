//! Diagnostic tracing on stderr.
//!
//! Tracing is separate from what a run prints: the per-attempt trace and the
//! final program go to stdout regardless of `RUST_LOG`, and attempt artifacts
//! are only written with `--log-dir`. Tracing output is never persisted.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset, blank or unparsable.
///
/// Only this crate's warnings (timeouts, truncated output, rejected model
/// requests) are shown; HTTP client internals stay quiet.
pub const DEFAULT_FILTER: &str = "fixloop=warn";

/// Install the stderr subscriber, reading directives from `RUST_LOG`.
///
/// ```bash
/// RUST_LOG=fixloop=debug fixloop run --task "print 1"
/// ```
pub fn init() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(directives.as_deref());

    // A subscriber installed earlier (tests, embedding) wins.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("ignoring invalid RUST_LOG ({err}); using {DEFAULT_FILTER}");
            EnvFilter::new(DEFAULT_FILTER)
        }),
        None => EnvFilter::new(DEFAULT_FILTER),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_uses_crate_default() {
        assert_eq!(filter_from(None).to_string(), DEFAULT_FILTER);
        assert_eq!(filter_from(Some("  ")).to_string(), DEFAULT_FILTER);
    }

    #[test]
    fn explicit_directives_are_kept() {
        assert_eq!(
            filter_from(Some("fixloop=debug")).to_string(),
            "fixloop=debug"
        );
    }

    #[test]
    fn invalid_directives_fall_back_to_default() {
        assert_eq!(
            filter_from(Some("fixloop=loudest")).to_string(),
            DEFAULT_FILTER
        );
    }
}
