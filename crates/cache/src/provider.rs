//! Cached provider statuses and their validity rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default lifetime of a cached provider status (one hour).
pub const DEFAULT_PROVIDER_STATUS_TTL: Duration = Duration::from_secs(3600);

/// Readiness of a provider's environment, as reported by its plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    /// Whether the environment is ready for use.
    pub ready: bool,
    /// Outputs exposed to dependants (e.g. cluster endpoints).
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// The plugin asked for this status never to be reused.
    #[serde(default)]
    pub disable_cache: bool,
    /// `Some(true)` when the status was served from the cache, `None` when it
    /// was freshly resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl ProviderStatus {
    /// A ready status with the given outputs.
    #[must_use]
    pub fn ready(outputs: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            ready: true,
            outputs,
            ..Self::default()
        }
    }

    /// A not-ready status with no outputs.
    #[must_use]
    pub fn not_ready() -> Self {
        Self::default()
    }
}

/// Why a cached status can or cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValidity {
    /// Hash matches and the entry is younger than the TTL.
    Valid,
    /// The config changed since the entry was written.
    HashMismatch,
    /// The entry is at least as old as the TTL.
    Expired,
    /// The entry was written with `disable_cache` and is never reused.
    Disabled,
}

/// A persisted provider status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProviderStatus {
    /// Hash of the provider config the status was resolved for.
    pub config_hash: String,
    /// When the status was resolved.
    pub resolved_at: DateTime<Utc>,
    /// The resolved status.
    pub status: ProviderStatus,
    /// Written for a status that asked not to be reused.
    #[serde(default)]
    pub disable_cache: bool,
}

impl CachedProviderStatus {
    /// Wrap a freshly resolved status for persistence.
    #[must_use]
    pub fn new(config_hash: impl Into<String>, resolved_at: DateTime<Utc>, status: ProviderStatus) -> Self {
        let disable_cache = status.disable_cache;
        Self {
            config_hash: config_hash.into(),
            resolved_at,
            status: ProviderStatus {
                cached: None,
                ..status
            },
            disable_cache,
        }
    }

    /// Check this entry against the current config hash at `now`.
    #[must_use]
    pub fn validity(&self, config_hash: &str, ttl: Duration, now: DateTime<Utc>) -> CacheValidity {
        if self.disable_cache {
            return CacheValidity::Disabled;
        }
        if self.config_hash != config_hash {
            return CacheValidity::HashMismatch;
        }

        // An entry from the future (clock skew) counts as fresh.
        let age = (now - self.resolved_at).to_std().unwrap_or(Duration::ZERO);
        if age >= ttl {
            CacheValidity::Expired
        } else {
            CacheValidity::Valid
        }
    }

    /// The cached status marked as served from the cache.
    #[must_use]
    pub fn into_cached_status(self) -> ProviderStatus {
        ProviderStatus {
            cached: Some(true),
            ..self.status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entry_resolved(seconds_ago: i64) -> (CachedProviderStatus, DateTime<Utc>) {
        let now = Utc::now();
        let entry = CachedProviderStatus::new(
            "hash",
            now - TimeDelta::seconds(seconds_ago),
            ProviderStatus::ready(BTreeMap::new()),
        );
        (entry, now)
    }

    #[test]
    fn fresh_entry_is_valid() {
        let (entry, now) = entry_resolved(0);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Valid
        );
    }

    #[test]
    fn entry_within_ttl_is_valid() {
        let (entry, now) = entry_resolved(3500);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Valid
        );
    }

    #[test]
    fn entry_at_ttl_is_expired() {
        let (entry, now) = entry_resolved(3600);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Expired
        );
    }

    #[test]
    fn entry_past_ttl_is_expired() {
        let (entry, now) = entry_resolved(3601);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Expired
        );
    }

    #[test]
    fn hash_mismatch_wins_over_recency() {
        let (entry, now) = entry_resolved(0);
        assert_eq!(
            entry.validity("other", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::HashMismatch
        );
    }

    #[test]
    fn disabled_entries_are_never_valid() {
        let now = Utc::now();
        let status = ProviderStatus {
            ready: true,
            disable_cache: true,
            ..ProviderStatus::default()
        };
        let entry = CachedProviderStatus::new("hash", now, status);
        assert!(entry.disable_cache);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Disabled
        );
    }

    #[test]
    fn future_entries_count_as_fresh() {
        let (entry, now) = entry_resolved(-60);
        assert_eq!(
            entry.validity("hash", DEFAULT_PROVIDER_STATUS_TTL, now),
            CacheValidity::Valid
        );
    }

    #[test]
    fn persisted_status_drops_cached_flag() {
        let status = ProviderStatus {
            cached: Some(true),
            ..ProviderStatus::default()
        };
        let entry = CachedProviderStatus::new("hash", Utc::now(), status);
        assert_eq!(entry.status.cached, None);
        assert_eq!(entry.into_cached_status().cached, Some(true));
    }
}
