use std::sync::OnceLock;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Default filter for an `AGENT_VERBOSITY` level (0 quiet, 1 progress, 2 debug).
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "mapbox_agent=info,warn",
        _ => "mapbox_agent=debug,mcp_server=debug,info",
    }
}

/// Filter directives for `verbosity`, unless `RUST_LOG` supplied its own.
pub fn resolve_filter(verbosity: u8, rust_log: Option<&str>) -> String {
    match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
        Some(directives) => directives.to_string(),
        None => default_filter(verbosity).to_string(),
    }
}

/// Reads a verbosity level, ignoring anything outside 0-2. Falls back to 1.
pub fn parse_verbosity(level: Option<&str>) -> u8 {
    level
        .and_then(|level| level.trim().parse().ok())
        .filter(|level| *level <= 2)
        .unwrap_or(1)
}

/// `AGENT_VERBOSITY` read ahead of the full configuration, so that config
/// loading itself can log.
pub fn verbosity_from_env() -> u8 {
    parse_verbosity(std::env::var("AGENT_VERBOSITY").ok().as_deref())
}

fn rust_log() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV).ok()
}

/// Installs the global subscriber. Output goes to stderr so stdout only
/// carries the answer. `RUST_LOG` takes precedence over `verbosity`.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::new(resolve_filter(verbosity, rust_log().as_deref()));
    let (filter, handle) = reload::Layer::new(filter);

    // A second init (e.g. from tests) keeps the first subscriber
    if tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbosity > 1))
        .try_init()
        .is_ok()
    {
        let _ = FILTER_HANDLE.set(handle);
    }
}

/// Switches the installed filter to the level from the loaded configuration.
/// Returns the directives now in effect, or `None` before `init`.
pub fn apply_verbosity(verbosity: u8) -> Option<String> {
    let handle = FILTER_HANDLE.get()?;
    let directives = resolve_filter(verbosity, rust_log().as_deref());
    handle.reload(EnvFilter::new(&directives)).ok()?;
    Some(directives)
}
