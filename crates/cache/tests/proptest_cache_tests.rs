//! Property-based tests for provider status cache keys and validity.
//!
//! These tests verify the behavioral contracts of the provider cache:
//! - Determinism: the same config always hashes the same way
//! - Order invariance: object key order doesn't affect the hash
//! - Sensitivity: changing a config value changes the hash
//! - Expiry: entries are valid strictly before the TTL and expired from it on

use chrono::{TimeDelta, Utc};
use garden_cache::{CacheValidity, CachedProviderStatus, ProviderStatus, hash_config};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::time::Duration;

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate config keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9_]{0,12}".prop_map(String::from)
}

/// Generate scalar config values
fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9./:-]{0,20}".prop_map(Value::String),
    ]
}

/// Generate a flat provider config as ordered entries
fn entries_strategy() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map(key_strategy(), scalar_strategy(), 0..8)
        .prop_map(|map| map.into_iter().collect())
}

fn object(entries: impl IntoIterator<Item = (String, Value)>) -> Value {
    Value::Object(entries.into_iter().collect::<Map<String, Value>>())
}

/// Render entries as JSON text in the given order, bypassing any map sorting
fn json_text(entries: &[(String, Value)]) -> String {
    let fields: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
        .collect();
    format!("{{{}}}", fields.join(","))
}

// =============================================================================
// Property Tests: Determinism and order invariance
// =============================================================================

proptest! {
    /// Contract: Same config always produces the same hash
    #[test]
    fn config_hash_is_deterministic(entries in entries_strategy()) {
        let config = object(entries);
        prop_assert_eq!(hash_config(&config), hash_config(&config.clone()));
    }

    /// Contract: Key order in the source document doesn't matter
    #[test]
    fn config_hash_ignores_key_order(entries in entries_strategy()) {
        let forward: Value = serde_json::from_str(&json_text(&entries)).unwrap();
        let mut reversed_entries = entries.clone();
        reversed_entries.reverse();
        let reversed: Value = serde_json::from_str(&json_text(&reversed_entries)).unwrap();

        prop_assert_eq!(hash_config(&forward), hash_config(&reversed));
    }

    /// Contract: Hashes are lowercase hex SHA-256 digests
    #[test]
    fn config_hash_is_hex_sha256(entries in entries_strategy()) {
        let hash = hash_config(&object(entries));
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

// =============================================================================
// Property Tests: Sensitivity (cache invalidation)
// =============================================================================

proptest! {
    /// Contract: Changing any value invalidates the cache
    #[test]
    fn different_value_produces_different_hash(
        entries in entries_strategy(),
        key in key_strategy(),
        value in scalar_strategy(),
    ) {
        let base = object(entries.clone());
        prop_assume!(base.get(&key) != Some(&value));

        let mut modified = entries;
        modified.retain(|(k, _)| k != &key);
        modified.push((key, value));

        prop_assert_ne!(hash_config(&base), hash_config(&object(modified)));
    }

    /// Contract: Nesting a config changes its hash
    #[test]
    fn nesting_produces_different_hash(entries in entries_strategy(), key in key_strategy()) {
        let flat = object(entries.clone());
        let nested = object([(key, object(entries))]);
        prop_assert_ne!(hash_config(&flat), hash_config(&nested));
    }
}

// =============================================================================
// Property Tests: TTL boundaries
// =============================================================================

proptest! {
    /// Contract: Entries younger than the TTL are valid, older ones expired
    #[test]
    fn validity_follows_ttl(ttl_secs in 1u64..86_400, age_secs in 0i64..172_800) {
        let now = Utc::now();
        let entry = CachedProviderStatus::new(
            "hash",
            now - TimeDelta::seconds(age_secs),
            ProviderStatus::ready(Default::default()),
        );
        let validity = entry.validity("hash", Duration::from_secs(ttl_secs), now);

        let expected = if u64::try_from(age_secs).unwrap() < ttl_secs {
            CacheValidity::Valid
        } else {
            CacheValidity::Expired
        };
        prop_assert_eq!(validity, expected);
    }

    /// Contract: A disabled entry is never valid, whatever its age or hash
    #[test]
    fn disabled_entries_are_never_valid(age_secs in 0i64..7_200) {
        let now = Utc::now();
        let mut status = ProviderStatus::ready(Default::default());
        status.disable_cache = true;
        let entry = CachedProviderStatus::new("hash", now - TimeDelta::seconds(age_secs), status);

        prop_assert_eq!(
            entry.validity("hash", Duration::from_secs(3600), now),
            CacheValidity::Disabled
        );
    }
}
