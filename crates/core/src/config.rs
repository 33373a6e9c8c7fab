//! Project configuration
//!
//! A project is described by a `garden.toml` at its root:
//!
//! ```toml
//! name = "demo"
//! default_environment = "dev"
//! environments = ["dev", "ci"]
//!
//! [solver]
//! max_parallel = 4
//!
//! [cache]
//! ttl_secs = 3600
//!
//! [[providers]]
//! name = "local-kubernetes"
//! environments = ["dev"]
//! config = { namespace = "demo" }
//!
//! [[actions]]
//! kind = "Deploy"
//! name = "api"
//! type = "container"
//! dependencies = ["build.api", { action = "run.migrate", needs_executed_outputs = true }]
//! ```
//!
//! Two environment variables override the file:
//! - `GARDEN_PROVIDER_STATUS_TTL` - provider status cache TTL in seconds
//! - `GARDEN_MAX_PARALLEL` - solver concurrency (0 = unlimited)

use crate::action::{Action, ActionDependency, ActionKind, ActionRef, ConfigGraph};
use crate::{Error, Result};
use garden_graph::{DependencyEdge, detect_cycles, format_cycle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// File name of the project configuration
pub const PROJECT_CONFIG_FILENAME: &str = "garden.toml";

/// Per-project state directory, next to the project config
pub const GARDEN_DIR_NAME: &str = ".garden";

/// Overrides `[cache] ttl_secs`
pub const ENV_PROVIDER_STATUS_TTL: &str = "GARDEN_PROVIDER_STATUS_TTL";

/// Overrides `[solver] max_parallel`
pub const ENV_MAX_PARALLEL: &str = "GARDEN_MAX_PARALLEL";

fn default_environment_name() -> String {
    "default".to_string()
}

fn default_environments() -> Vec<String> {
    vec![default_environment_name()]
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Root of `garden.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,
    /// Environment used when none is requested
    #[serde(default = "default_environment_name")]
    pub default_environment: String,
    /// Known environments
    #[serde(default = "default_environments")]
    pub environments: Vec<String>,
    /// Solver settings
    #[serde(default)]
    pub solver: SolverConfig,
    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Configured providers
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Configured actions
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// `[solver]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Maximum concurrently running tasks (0 = unlimited)
    #[serde(default)]
    pub max_parallel: usize,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Provider status TTL in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    garden_cache::DEFAULT_PROVIDER_STATUS_TTL.as_secs()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// TTL as a duration
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// A configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider name, also selecting its plugin handler
    pub name: String,
    /// Providers that must be resolved first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Environments the provider is enabled in (all when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,
    /// Plugin-specific configuration
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl ProviderConfig {
    /// A provider enabled everywhere with an empty config
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            environments: None,
            config: empty_object(),
        }
    }

    /// Builder: set the plugin config
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Builder: add a provider dependency
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Whether the provider is enabled in `environment`
    #[must_use]
    pub fn is_enabled_for(&self, environment: &str) -> bool {
        self.environments
            .as_ref()
            .is_none_or(|envs| envs.iter().any(|e| e == environment))
    }
}

/// A configured action, as written in `garden.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    /// `Build`, `Deploy`, `Run` or `Test` (case-insensitive)
    pub kind: ActionKind,
    /// Action name
    pub name: String,
    /// Action type
    #[serde(rename = "type")]
    pub action_type: String,
    /// Dependencies
    #[serde(default)]
    pub dependencies: Vec<DependencyConfig>,
    /// Disable the action
    #[serde(default)]
    pub disabled: bool,
    /// Type-specific spec
    #[serde(default = "empty_object")]
    pub spec: Value,
}

/// A dependency written either as `"<kind>.<name>"` or as a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyConfig {
    /// `"build.api"`
    Reference(ActionRef),
    /// `{ action = "build.api", needs_static_outputs = true }`
    Detailed {
        /// The action depended on
        action: ActionRef,
        /// Reads outputs known before execution
        #[serde(default)]
        needs_static_outputs: bool,
        /// Reads outputs known after execution
        #[serde(default)]
        needs_executed_outputs: bool,
    },
}

impl From<&DependencyConfig> for ActionDependency {
    fn from(config: &DependencyConfig) -> Self {
        match config {
            DependencyConfig::Reference(action) => Self::new(action.clone()),
            DependencyConfig::Detailed {
                action,
                needs_static_outputs,
                needs_executed_outputs,
            } => Self {
                action: action.clone(),
                explicit: true,
                needs_static_outputs: *needs_static_outputs,
                needs_executed_outputs: *needs_executed_outputs,
            },
        }
    }
}

impl From<&ActionConfig> for Action {
    fn from(config: &ActionConfig) -> Self {
        Self {
            kind: config.kind,
            name: config.name.clone(),
            action_type: config.action_type.clone(),
            dependencies: config.dependencies.iter().map(ActionDependency::from).collect(),
            disabled: config.disabled,
            spec: config.spec.clone(),
        }
    }
}

impl From<&ActionDependency> for DependencyConfig {
    fn from(dependency: &ActionDependency) -> Self {
        if dependency.needs_outputs() {
            Self::Detailed {
                action: dependency.action.clone(),
                needs_static_outputs: dependency.needs_static_outputs,
                needs_executed_outputs: dependency.needs_executed_outputs,
            }
        } else {
            Self::Reference(dependency.action.clone())
        }
    }
}

impl From<&Action> for ActionConfig {
    fn from(action: &Action) -> Self {
        Self {
            kind: action.kind,
            name: action.name.clone(),
            action_type: action.action_type.clone(),
            dependencies: action.dependencies.iter().map(DependencyConfig::from).collect(),
            disabled: action.disabled,
            spec: action.spec.clone(),
        }
    }
}

impl ProjectConfig {
    /// A project with defaults and nothing configured
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_environment: default_environment_name(),
            environments: default_environments(),
            solver: SolverConfig::default(),
            cache: CacheConfig::default(),
            providers: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            Error::configuration(format!("Failed to parse project config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a `garden.toml`
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration { message, help } => Error::Configuration {
                message: format!("{}: {message}", path.display()),
                help,
            },
            other => other,
        })
    }

    /// Apply `GARDEN_PROVIDER_STATUS_TTL` and `GARDEN_MAX_PARALLEL`
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(ttl) = env_override::<u64>(ENV_PROVIDER_STATUS_TTL)? {
            tracing::debug!(ttl_secs = ttl, "Provider status TTL overridden from environment");
            self.cache.ttl_secs = ttl;
        }
        if let Some(max_parallel) = env_override::<usize>(ENV_MAX_PARALLEL)? {
            tracing::debug!(max_parallel, "Solver concurrency overridden from environment");
            self.solver.max_parallel = max_parallel;
        }
        Ok(self)
    }

    /// Check internal consistency: environments, provider names and provider dependencies
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("Project name must not be empty"));
        }
        for environment in &self.environments {
            check_path_safe_name("Environment", environment)?;
        }
        if !self.environments.contains(&self.default_environment) {
            return Err(Error::configuration(format!(
                "Default environment '{}' is not one of the configured environments ({})",
                self.default_environment,
                self.environments.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            check_path_safe_name("Provider", &provider.name)?;
            if !names.insert(provider.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Provider '{}' is configured more than once",
                    provider.name
                )));
            }
            for env in provider.environments.iter().flatten() {
                if !self.environments.contains(env) {
                    return Err(Error::configuration(format!(
                        "Provider '{}' is enabled for unknown environment '{env}'",
                        provider.name
                    )));
                }
            }
        }

        let mut edges = Vec::new();
        for provider in &self.providers {
            for dependency in &provider.dependencies {
                if !names.contains(dependency.as_str()) {
                    return Err(Error::configuration(format!(
                        "Provider '{}' depends on unknown provider '{dependency}'",
                        provider.name
                    )));
                }
                edges.push(DependencyEdge::new(&provider.name, dependency));
            }
        }
        let cycles = detect_cycles(&edges);
        if let Some(cycle) = cycles.first() {
            return Err(Error::configuration(format!(
                "Detected circular dependencies between providers: {}",
                format_cycle(cycle)
            )));
        }

        Ok(())
    }

    /// The requested environment, or the default; unknown names are a configuration error
    pub fn resolve_environment(&self, requested: Option<&str>) -> Result<String> {
        let environment = requested.unwrap_or(&self.default_environment);
        if self.environments.iter().any(|e| e == environment) {
            Ok(environment.to_string())
        } else {
            Err(Error::configuration_with_help(
                format!("Unknown environment '{environment}'"),
                format!("Configured environments: {}", self.environments.join(", ")),
            ))
        }
    }

    /// Providers enabled in `environment`.
    ///
    /// An enabled provider depending on one that is disabled in the same
    /// environment is a configuration error.
    pub fn providers_for(&self, environment: &str) -> Result<Vec<ProviderConfig>> {
        let enabled: Vec<ProviderConfig> = self
            .providers
            .iter()
            .filter(|p| p.is_enabled_for(environment))
            .cloned()
            .collect();

        for provider in &enabled {
            for dependency in &provider.dependencies {
                if !enabled.iter().any(|p| &p.name == dependency) {
                    return Err(Error::configuration(format!(
                        "Provider '{}' depends on '{dependency}', which is not enabled in environment '{environment}'",
                        provider.name
                    )));
                }
            }
        }
        Ok(enabled)
    }

    /// Actions as configured
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.actions.iter().map(Action::from).collect()
    }

    /// Validated action graph
    pub fn config_graph(&self) -> Result<ConfigGraph> {
        ConfigGraph::new(self.actions())
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::configuration(format!("Invalid value '{value}' for {name}: {e}"))),
        _ => Ok(None),
    }
}

/// Provider and environment names end up in cache file names
fn check_path_safe_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(Error::configuration_with_help(
            format!("{what} name '{}' is not allowed", name.escape_default()),
            "Names must be non-empty and must not contain path separators",
        ));
    }
    Ok(())
}
