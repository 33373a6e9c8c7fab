//! The per-invocation project context shared by all tasks

use crate::action::ConfigGraph;
use crate::config::{GARDEN_DIR_NAME, PROJECT_CONFIG_FILENAME, ProjectConfig, ProviderConfig};
use crate::plugin::PluginRegistry;
use crate::{Error, Result};
use garden_cache::{FsStatusStore, MemoryStatusStore, ProviderStatusStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A loaded project in one environment.
///
/// Holds the validated action graph, the providers enabled for the
/// environment, the plugin handlers and the provider status cache. Tasks keep
/// an `Arc<Garden>` for the lifetime of a solve.
#[derive(Debug)]
pub struct Garden {
    project_name: String,
    environment: String,
    config_graph: ConfigGraph,
    providers: Vec<ProviderConfig>,
    plugins: PluginRegistry,
    garden_dir: Option<PathBuf>,
    provider_store: Arc<dyn ProviderStatusStore>,
    provider_status_ttl: Duration,
    max_parallel: usize,
}

impl Garden {
    /// Build a context from an already loaded config.
    ///
    /// Provider statuses are cached in memory until [`Garden::with_garden_dir`]
    /// or [`Garden::with_provider_store`] says otherwise.
    pub fn new(
        config: &ProjectConfig,
        environment: Option<&str>,
        plugins: PluginRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let environment = config.resolve_environment(environment)?;
        let providers = config.providers_for(&environment)?;
        let config_graph = config.config_graph()?;

        tracing::debug!(
            project = %config.name,
            environment = %environment,
            actions = config_graph.len(),
            providers = providers.len(),
            "Loaded project"
        );

        Ok(Self {
            project_name: config.name.clone(),
            environment,
            config_graph,
            providers,
            plugins,
            garden_dir: None,
            provider_store: Arc::new(MemoryStatusStore::new()),
            provider_status_ttl: config.cache.ttl(),
            max_parallel: config.solver.max_parallel,
        })
    }

    /// Load `<project_root>/garden.toml`, apply environment overrides and
    /// cache provider statuses under `<project_root>/.garden`.
    pub fn load(
        project_root: &Path,
        environment: Option<&str>,
        plugins: PluginRegistry,
    ) -> Result<Self> {
        let config_path = project_root.join(PROJECT_CONFIG_FILENAME);
        if !config_path.is_file() {
            return Err(Error::configuration_with_help(
                format!("No {PROJECT_CONFIG_FILENAME} found in {}", project_root.display()),
                "Run from the project root or create a project config",
            ));
        }
        let config = ProjectConfig::from_path(&config_path)?.with_env_overrides()?;
        Ok(Self::new(&config, environment, plugins)?.with_garden_dir(project_root.join(GARDEN_DIR_NAME)))
    }

    /// Persist provider statuses on disk under `garden_dir`
    #[must_use]
    pub fn with_garden_dir(mut self, garden_dir: impl Into<PathBuf>) -> Self {
        let garden_dir = garden_dir.into();
        self.provider_store = Arc::new(FsStatusStore::for_garden_dir(&garden_dir));
        self.garden_dir = Some(garden_dir);
        self
    }

    /// Use a specific provider status store
    #[must_use]
    pub fn with_provider_store(mut self, store: Arc<dyn ProviderStatusStore>) -> Self {
        self.provider_store = store;
        self
    }

    /// Override the provider status TTL
    #[must_use]
    pub fn with_provider_status_ttl(mut self, ttl: Duration) -> Self {
        self.provider_status_ttl = ttl;
        self
    }

    /// Override solver concurrency (0 = unlimited)
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Project name
    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Active environment
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Validated action graph
    #[must_use]
    pub fn config_graph(&self) -> &ConfigGraph {
        &self.config_graph
    }

    /// Registered plugin handlers
    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Providers enabled in the active environment
    #[must_use]
    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    /// Config of an enabled provider; unknown names are a parameter error
    pub fn provider_config(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name).ok_or_else(|| {
            Error::parameter(format!(
                "Provider '{name}' is not configured for environment '{}'",
                self.environment
            ))
        })
    }

    /// Project state directory, when statuses are persisted on disk
    #[must_use]
    pub fn garden_dir(&self) -> Option<&Path> {
        self.garden_dir.as_deref()
    }

    /// Provider status cache
    #[must_use]
    pub fn provider_store(&self) -> &Arc<dyn ProviderStatusStore> {
        &self.provider_store
    }

    /// Provider status TTL
    #[must_use]
    pub fn provider_status_ttl(&self) -> Duration {
        self.provider_status_ttl
    }

    /// Solver concurrency (0 = unlimited)
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT: &str = r#"
name = "demo"
default_environment = "dev"
environments = ["dev", "ci"]

[[providers]]
name = "local-kubernetes"
environments = ["dev"]

[[actions]]
kind = "Build"
name = "api"
type = "container"
"#;

    #[test]
    fn new_resolves_environment_and_providers() {
        let config = ProjectConfig::from_toml_str(PROJECT).unwrap();
        let garden = Garden::new(&config, Some("ci"), PluginRegistry::new()).unwrap();
        assert_eq!(garden.environment(), "ci");
        assert!(garden.providers().is_empty());
        assert!(garden.garden_dir().is_none());
        assert_eq!(garden.config_graph().len(), 1);

        let err = garden.provider_config("local-kubernetes").unwrap_err();
        assert_eq!(err.error_type(), "parameter");
    }

    #[test]
    fn new_rejects_unknown_environment() {
        let config = ProjectConfig::from_toml_str(PROJECT).unwrap();
        let err = Garden::new(&config, Some("prod"), PluginRegistry::new()).unwrap_err();
        assert_eq!(err.error_type(), "configuration");
    }

    #[test]
    fn load_uses_project_garden_dir() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(PROJECT_CONFIG_FILENAME), PROJECT).unwrap();

        let garden = temp_env::with_vars_unset(
            [crate::config::ENV_PROVIDER_STATUS_TTL, crate::config::ENV_MAX_PARALLEL],
            || Garden::load(tmp.path(), None, PluginRegistry::new()),
        )
        .unwrap();

        assert_eq!(garden.project_name(), "demo");
        assert_eq!(garden.environment(), "dev");
        assert_eq!(garden.garden_dir(), Some(tmp.path().join(".garden").as_path()));
        assert_eq!(garden.provider_status_ttl(), Duration::from_secs(3600));
        assert!(garden.provider_config("local-kubernetes").is_ok());
    }

    #[test]
    fn load_without_config_fails() {
        let tmp = TempDir::new().unwrap();
        let err = Garden::load(tmp.path(), None, PluginRegistry::new()).unwrap_err();
        assert!(err.to_string().contains(PROJECT_CONFIG_FILENAME));
    }
}
