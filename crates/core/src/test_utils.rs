//! Shared test utilities for garden-core tests.
//!
//! Fixture actions, gardens and recording plugin handlers.

use crate::action::{Action, ActionDependency, ActionKind};
use crate::config::{ActionConfig, ProjectConfig};
use crate::garden::Garden;
use crate::plugin::{ActionContext, ActionHandler, ActionStatus, PluginRegistry, ProviderContext, ProviderHandler};
use crate::{Error, Result};
use async_trait::async_trait;
use garden_cache::ProviderStatus;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn depends_on(reference: &str) -> ActionDependency {
    ActionDependency::new(reference.parse().expect("valid action reference"))
}

/// The six-action project used across solver tests:
///
/// ```text
/// build.module-a
/// deploy.service-a     -> build.module-a
/// deploy.service-b     -> build.module-a
/// run.task-a           -> deploy.service-a
/// test.module-a-integ  -> build.module-a
/// test.test-b          -> build.module-a, deploy.service-b, run.task-a, test.module-a-integ
/// ```
pub fn scenario_actions() -> Vec<Action> {
    vec![
        Action::new(ActionKind::Build, "module-a", "container"),
        Action::new(ActionKind::Deploy, "service-a", "container").with_dependency(depends_on("build.module-a")),
        Action::new(ActionKind::Deploy, "service-b", "container").with_dependency(depends_on("build.module-a")),
        Action::new(ActionKind::Run, "task-a", "exec").with_dependency(depends_on("deploy.service-a")),
        Action::new(ActionKind::Test, "module-a-integ", "exec").with_dependency(depends_on("build.module-a")),
        Action::new(ActionKind::Test, "test-b", "exec")
            .with_dependency(depends_on("build.module-a"))
            .with_dependency(depends_on("deploy.service-b"))
            .with_dependency(depends_on("run.task-a"))
            .with_dependency(depends_on("test.module-a-integ")),
    ]
}

/// Garden over `actions` with no plugins registered
pub fn garden_with(actions: Vec<Action>) -> Arc<Garden> {
    garden_with_plugins(actions, PluginRegistry::new())
}

/// Garden over `actions` with the given plugins
pub fn garden_with_plugins(actions: Vec<Action>, plugins: PluginRegistry) -> Arc<Garden> {
    let mut config = ProjectConfig::new("test");
    config.actions = actions.iter().map(ActionConfig::from).collect();
    Arc::new(Garden::new(&config, None, plugins).expect("valid test garden"))
}

/// Action handler with a fixed status that records executions
#[derive(Debug, Default)]
pub struct StaticActionHandler {
    ready: bool,
    provider: Option<String>,
    executions: Mutex<Vec<String>>,
    modes: Mutex<BTreeMap<String, (bool, bool)>>,
}

impl StaticActionHandler {
    /// Reports every action as ready
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Reports every action as not ready
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// Require a provider for this action type
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Keys of executed actions, in execution order
    pub fn executions(&self) -> Vec<String> {
        self.executions.lock().unwrap().clone()
    }

    /// `(sync_mode, local_mode)` each action was executed with
    pub fn modes(&self) -> BTreeMap<String, (bool, bool)> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionHandler for StaticActionHandler {
    fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    async fn get_status(&self, _ctx: &ActionContext) -> Result<ActionStatus> {
        Ok(if self.ready {
            ActionStatus::ready(BTreeMap::new())
        } else {
            ActionStatus::not_ready()
        })
    }

    async fn execute(&self, ctx: &ActionContext) -> Result<ActionStatus> {
        let key = ctx.action.key();
        self.executions.lock().unwrap().push(key.clone());
        self.modes
            .lock()
            .unwrap()
            .insert(key.clone(), (ctx.sync_mode, ctx.local_mode));

        let mut outputs = BTreeMap::new();
        outputs.insert("executed".to_string(), Value::String(key));
        Ok(ActionStatus::ready(outputs))
    }
}

/// Provider handler that counts how often it is asked for a status
#[derive(Debug, Default)]
pub struct CountingProvider {
    ready: bool,
    disable_cache: bool,
    unpreparable: bool,
    failure: Option<String>,
    calls: AtomicUsize,
    prepared: AtomicUsize,
}

impl CountingProvider {
    /// Environment is always ready
    pub fn ready() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// Environment needs preparing
    pub fn not_ready() -> Self {
        Self::default()
    }

    /// Status checks fail with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Statuses opt out of caching
    pub fn disable_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    /// Preparing the environment leaves it not ready
    pub fn unpreparable(mut self) -> Self {
        self.unpreparable = true;
        self
    }

    /// Number of status checks
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of environment preparations
    pub fn prepared(&self) -> usize {
        self.prepared.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderHandler for CountingProvider {
    async fn get_environment_status(&self, ctx: &ProviderContext) -> Result<ProviderStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(Error::plugin(&ctx.config.name, message));
        }

        let mut status = if self.ready {
            let mut outputs = BTreeMap::new();
            outputs.insert("environment".to_string(), Value::String(ctx.environment.clone()));
            ProviderStatus::ready(outputs)
        } else {
            ProviderStatus::not_ready()
        };
        status.disable_cache = self.disable_cache;
        Ok(status)
    }

    async fn prepare_environment(&self, _ctx: &ProviderContext, mut status: ProviderStatus) -> Result<ProviderStatus> {
        self.prepared.fetch_add(1, Ordering::SeqCst);
        status.ready = !self.unpreparable;
        Ok(status)
    }
}
