//! Provider status caching for Garden
//!
//! Resolving a provider's environment status can be expensive (cloud API
//! calls, cluster checks). This crate persists resolved statuses so that the
//! next resolution can reuse them:
//! - Entries are keyed by provider and environment
//! - Each entry records the hash of the config it was resolved for
//! - Entries expire after a TTL (one hour by default)
//!
//! # Validity
//!
//! A cached status is reused only if its config hash matches the current
//! config, it is younger than the TTL, and it was not written with
//! `disable_cache`. Unreadable entries are treated as absent.

mod error;
pub mod hash;
pub mod provider;
pub mod store;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use hash::{canonical_json, hash_config, hash_serializable};
pub use provider::{
    CacheValidity, CachedProviderStatus, DEFAULT_PROVIDER_STATUS_TTL, ProviderStatus,
};
pub use store::{
    FsStatusStore, MemoryStatusStore, PROVIDER_STATUS_DIR, ProviderStatusStore, provider_status_key,
};
