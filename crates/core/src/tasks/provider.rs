//! Provider resolution with a hash and TTL validated status cache

use super::{GraphResults, Task, TaskOutput, resolve_provider_key};
use crate::config::ProviderConfig;
use crate::garden::Garden;
use crate::plugin::ProviderContext;
use crate::{Error, Result};
use chrono::Utc;
use garden_cache::{
    CacheValidity, CachedProviderStatus, ProviderStatus, hash_serializable, provider_status_key,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A resolved provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provider {
    /// Provider name
    pub name: String,
    /// Its configuration
    pub config: ProviderConfig,
    /// Resolved providers it depends on
    pub dependencies: BTreeMap<String, Provider>,
    /// Environment status; `status.cached` tells cache hits from fresh resolutions
    pub status: ProviderStatus,
}

/// Resolves a provider's environment status, reusing a cached status when valid
#[derive(Clone)]
pub struct ResolveProviderTask {
    garden: Arc<Garden>,
    config: ProviderConfig,
    /// Ignore any cached status
    pub force_refresh: bool,
}

impl ResolveProviderTask {
    /// Task for a provider config
    #[must_use]
    pub fn new(garden: Arc<Garden>, config: ProviderConfig, force_refresh: bool) -> Self {
        Self {
            garden,
            config,
            force_refresh,
        }
    }

    /// Task for a provider enabled in the active environment; unknown names are a parameter error
    pub fn for_provider(garden: Arc<Garden>, name: &str, force_refresh: bool) -> Result<Self> {
        let config = garden.provider_config(name)?.clone();
        Ok(Self::new(garden, config, force_refresh))
    }

    /// `resolve-provider.<name>`
    #[must_use]
    pub fn key(&self) -> String {
        resolve_provider_key(&self.config.name)
    }

    /// Provider name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Provider config
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Providers this provider depends on
    pub fn resolve_process_dependencies(&self) -> Result<Vec<Task>> {
        self.config
            .dependencies
            .iter()
            .map(|name| {
                let config = self.garden.provider_config(name)?.clone();
                Ok(Self::new(Arc::clone(&self.garden), config, self.force_refresh).into())
            })
            .collect()
    }

    /// `<provider>.<environment>`
    #[must_use]
    pub fn cache_key(&self) -> String {
        provider_status_key(&self.config.name, self.garden.environment())
    }

    /// On-disk location of the cached status, when the store keeps one
    #[must_use]
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.garden.provider_store().location(&self.cache_key())
    }

    /// Stable hash of the provider config; key order and formatting do not matter
    pub fn hash_config(&self) -> Result<String> {
        Ok(hash_serializable(&self.config)?)
    }

    /// The cached status if it may be reused for `config_hash`
    #[must_use]
    pub fn get_cached_status(&self, config_hash: &str) -> Option<CachedProviderStatus> {
        let key = self.cache_key();
        let entry = self.garden.provider_store().get(&key)?;
        match entry.validity(config_hash, self.garden.provider_status_ttl(), Utc::now()) {
            CacheValidity::Valid => Some(entry),
            reason => {
                tracing::debug!(provider = %self.config.name, key = %key, ?reason, "Cached provider status not reusable");
                None
            }
        }
    }

    /// Resolve the provider, from cache when possible
    pub async fn process(&self, dependencies: &GraphResults) -> Result<Provider> {
        let config_hash = self.hash_config()?;
        let resolved_dependencies = self.resolved_dependencies(dependencies);

        if self.force_refresh {
            tracing::debug!(provider = %self.config.name, "Forcing provider status refresh");
        } else if let Some(entry) = self.get_cached_status(&config_hash) {
            tracing::debug!(
                provider = %self.config.name,
                resolved_at = %entry.resolved_at,
                "Using cached provider status"
            );
            return Ok(self.provider(resolved_dependencies, entry.into_cached_status()));
        }

        let handler = self.garden.plugins().provider_handler(&self.config.name).ok_or_else(|| {
            Error::plugin(
                &self.config.name,
                "No provider handler registered",
            )
        })?;

        let ctx = ProviderContext {
            config: self.config.clone(),
            environment: self.garden.environment().to_string(),
            dependencies: resolved_dependencies.clone(),
        };

        tracing::info!(provider = %self.config.name, environment = %ctx.environment, "Resolving provider status");
        let mut status = handler.get_environment_status(&ctx).await?;
        if !status.ready {
            tracing::info!(provider = %self.config.name, "Preparing provider environment");
            status = handler.prepare_environment(&ctx, status).await?;
            if !status.ready {
                return Err(Error::plugin(
                    &self.config.name,
                    "reports status as not ready and could not prepare the environment",
                ));
            }
        }
        status.cached = None;

        let entry = CachedProviderStatus::new(config_hash, Utc::now(), status.clone());
        if let Err(e) = self.garden.provider_store().set(&self.cache_key(), &entry) {
            tracing::warn!(provider = %self.config.name, error = %e, "Failed to cache provider status");
        }

        Ok(self.provider(resolved_dependencies, status))
    }

    fn resolved_dependencies(&self, dependencies: &GraphResults) -> BTreeMap<String, Provider> {
        self.config
            .dependencies
            .iter()
            .filter_map(|name| {
                dependencies
                    .get(&resolve_provider_key(name))
                    .and_then(|r| r.output.as_ref())
                    .and_then(TaskOutput::as_provider)
                    .map(|p| (name.clone(), p.clone()))
            })
            .collect()
    }

    fn provider(&self, dependencies: BTreeMap<String, Provider>, status: ProviderStatus) -> Provider {
        Provider {
            name: self.config.name.clone(),
            config: self.config.clone(),
            dependencies,
            status,
        }
    }
}

impl fmt::Debug for ResolveProviderTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveProviderTask")
            .field("key", &self.key())
            .field("force_refresh", &self.force_refresh)
            .finish()
    }
}
