//! Tracing output for strata-based binaries and test runs.
//!
//! `STRATA_LOG` takes a full filter directive string, not just a level:
//! `info`, `debug`, `strata_core=trace,info`, and so on. Resolution stages
//! log under `strata_core` targets and the watch loop under
//! `strata_watch`, so per-crate directives isolate either side.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_env("STRATA_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the process-level subscriber from `STRATA_LOG`.
///
/// Safe to call multiple times; only the first call installs anything.
/// Intentionally best-effort: a subscriber installed by the embedding
/// application wins and this becomes a no-op.
pub fn init() {
    INIT.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }

    #[test]
    fn unset_or_malformed_directives_fall_back_to_info() {
        // `try_from_env` errors on both unset and unparsable values; either
        // way the fallback keeps logging usable.
        let rendered = filter().to_string();
        assert!(!rendered.is_empty());
    }
}
