//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set. Otherwise the level follows the global flags:
//! `--quiet` shows errors only, default is `warn`, `-v` is `info` and `-vv`
//! is `debug`. Events always go to stderr so `--json` output stays clean.

use std::io::IsTerminal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Default filter directive for the given flags.
pub(crate) fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. A second call is a no-op.
pub(crate) fn init(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(verbose > 1)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}
