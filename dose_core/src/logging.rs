//! Tracing setup for the `doses` binary and the core tests.
//!
//! Events go to stderr so schedule output on stdout stays clean. Only the
//! dose crates follow the verbosity flag; dependencies stay at WARN.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events the verbosity flag controls
const TARGETS: &[&str] = &["dose_core", "dose_cli"];

/// Level for a count of `-v` flags
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Filter directive raising the dose crates to `level`
fn directive(level: &str) -> String {
    std::iter::once("warn".to_string())
        .chain(TARGETS.iter().map(|target| format!("{}={}", target, level)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize logging for a CLI run
///
/// `RUST_LOG`, when set, replaces the verbosity-derived filter entirely.
/// Targets are shown from `-vv` up.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(level_for(verbosity))));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(verbosity > 1)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(directive("debug")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(7), "trace");
    }

    #[test]
    fn test_directive_scopes_dose_crates() {
        assert_eq!(
            directive("debug"),
            "warn,dose_core=debug,dose_cli=debug"
        );
        assert!(EnvFilter::try_new(directive("info")).is_ok());
    }
}
