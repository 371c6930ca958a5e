//! Structured logging setup for applications embedding this crate.
//!
//! Key material never appears in any event field; content keys are redacted in
//! `Debug` output and only lengths, key ids and algorithm names are logged.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global JSON-formatted [`tracing_subscriber`].
///
/// `RUST_LOG` takes precedence over `log_level` when set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(())
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        // Another test may already own the global subscriber, so only the
        // second call is asserted.
        let _ = init("debug");
        assert!(init("debug").is_err());
    }
}
