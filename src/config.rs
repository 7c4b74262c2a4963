//! Engine-wide configuration.
//!
//! The channel size limit, timeouts, and pacing are properties of the
//! signaling provider rather than of the engine, so every tunable lives here
//! with defaults matching a typical 6–8 KB signaling channel. Hosts can
//! deserialize an [`EngineConfig`] from JSON; durations are expressed in
//! milliseconds.

use serde::Deserialize;

use crate::{fragment::FragmentationConfig, replicator::ReplicationConfig, retry::RetryPolicy};

/// Aggregate configuration for a [`SyncSession`](crate::session::SyncSession).
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Chunked transfer settings.
    pub fragmentation: FragmentationConfig,
    /// Continuous-state replication settings.
    pub replication: ReplicationConfig,
    /// Retry policy for sync and action sends.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Parse a JSON document, filling omitted fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] when the document is not valid JSON or
    /// a field has the wrong type.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use tandem::config::EngineConfig;
    ///
    /// let cfg = EngineConfig::from_json(r#"{ "fragmentation": { "frameBudget": 8000 } }"#)
    ///     .expect("valid config");
    /// assert_eq!(cfg.fragmentation.frame_budget, 8_000);
    /// assert_eq!(cfg.replication.freshness_window, Duration::from_secs(1));
    /// ```
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(text).map(Self::normalized)
    }

    /// Normalize every section.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            fragmentation: self.fragmentation.normalized(),
            replication: self.replication.normalized(),
            retry: self.retry.normalized(),
        }
    }
}

/// Serde adapter representing a [`Duration`](std::time::Duration) as whole
/// milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
