// Logging for the venered binary, powered by tracing-subscriber.
//
// `tracing_log::LogTracer` forwards the `log::*` records emitted by
// venered-link into the tracing subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{CLIError, Result};

/// Noisy dependencies capped regardless of the chosen level.
const NOISY_TARGETS: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
    ("h2", "warn"),
    ("tungstenite", "warn"),
    ("tokio_tungstenite", "warn"),
];

/// Pick the filter: `--log-level`, then `RUST_LOG`, then the config value.
pub fn resolve_level(flag: Option<&str>, rust_log: Option<String>, configured: &str) -> String {
    flag.map(str::to_string)
        .or_else(|| rust_log.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| configured.to_string())
}

/// Build the `EnvFilter` from the base directive plus the noisy-crate caps.
pub fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let mut directives = vec![level.to_string()];
    for (target, lvl) in NOISY_TARGETS {
        directives.push(format!("{}={}", target, lvl));
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| CLIError::LoggingError(format!("Invalid filter '{}': {}", filter_str, e)))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
pub fn init_logging(level: &str, color: bool) -> Result<()> {
    tracing_log::LogTracer::init().ok();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(true)
        .with_filter(build_env_filter(level)?);

    let subscriber = tracing_subscriber::registry().with(console_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CLIError::LoggingError(e.to_string()))?;

    tracing::trace!("Logging initialized: level={}", level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_precedence() {
        assert_eq!(resolve_level(Some("debug"), Some("info".into()), "warn"), "debug");
        assert_eq!(resolve_level(None, Some("info".into()), "warn"), "info");
        assert_eq!(resolve_level(None, Some(" ".into()), "warn"), "warn");
        assert_eq!(resolve_level(None, None, "error"), "error");
    }

    #[test]
    fn test_filter_accepts_targets() {
        assert!(build_env_filter("venered_link=debug").is_ok());
        assert!(build_env_filter("info").is_ok());
    }

    #[test]
    fn test_filter_rejects_garbage() {
        assert!(matches!(build_env_filter("venered_link=loudest"), Err(CLIError::LoggingError(_))));
    }
}
