//! Settings for the cache and input layers.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Age after which a successful entry is refetched on the next subscribe.
    /// `None` means data only goes stale through explicit invalidation.
    pub stale_after: Option<Duration>,
    /// Keep entries around after their last subscriber leaves so the next
    /// subscriber sees cached data while it revalidates.
    pub retain_unused: bool,
}

impl CacheSettings {
    /// Create cache settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the staleness age.
    pub fn with_stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = Some(duration);
        self
    }

    /// Retain or evict zero-subscriber entries.
    pub fn with_retain_unused(mut self, retain: bool) -> Self {
        self.retain_unused = retain;
        self
    }
}

/// Input debounce settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceSettings {
    /// Quiet interval before a pending value is emitted.
    pub delay: Duration,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(300),
        }
    }
}

impl DebounceSettings {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "debounce.delay".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
