//! Tracing subscriber setup for binaries built on the client.

use crate::error::{ClientError, ClientResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SYNCWELL_LOG";

pub const DEFAULT_FILTER: &str = "warn,syncwell_cache=info,syncwell_tree=info,syncwell_client=info";

/// Resolve the log filter from `SYNCWELL_LOG`, then `RUST_LOG`, then the default.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber, writing to stderr. Fails if one is already set.
pub fn init_tracing(json: bool) -> ClientResult<()> {
    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ClientError::Telemetry(e.to_string()))?;

    tracing::debug!(json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let first = init_tracing(false);
        let second = init_tracing(true);
        // Another test may have installed a subscriber first.
        assert!(first.is_err() || second.is_err());
        assert!(matches!(second, Err(ClientError::Telemetry(_))));
    }
}
