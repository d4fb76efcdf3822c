//! Tracing setup and small helpers for logging upstream payloads.

use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

const DEFAULT_FILTER: &str = "claude_azure_proxy=info,tower_http=info";
const DEBUG_FILTER: &str = "claude_azure_proxy=debug,tower_http=debug";

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        DEBUG_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Handle to the installed filter, used to switch to debug output once the
/// config file has been read.
pub struct LogHandle {
    filter: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogHandle {
    /// Replace the default filter. No-op when `RUST_LOG` was set or another
    /// subscriber was already installed.
    pub fn set_debug(&self, debug: bool) {
        let Some(ref filter) = self.filter else {
            return;
        };
        if let Err(e) = filter.reload(EnvFilter::new(default_filter(debug))) {
            tracing::warn!(error = %e, "Failed to update log filter");
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `debug`.
pub fn init(debug: bool) -> LogHandle {
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_set = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new(default_filter(debug))));

    // A subscriber may already be installed (tests, embedding applications).
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    LogHandle {
        filter: (installed && !env_set).then_some(handle),
    }
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
