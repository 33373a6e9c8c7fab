//! Plugin handler interfaces
//!
//! The core never talks to clusters, registries or CLIs itself. Plugins
//! register handlers per action kind and type, and per provider, and the
//! tasks call into them.

use crate::Result;
use crate::action::{Action, ActionKind};
use crate::config::ProviderConfig;
use crate::tasks::{Provider, ResolvedAction};
use async_trait::async_trait;
use garden_cache::ProviderStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Tri-state readiness reported by action handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionState {
    /// The action is in its desired state
    Ready,
    /// The action needs to be (re-)executed
    NotReady,
    /// The state could not be determined
    #[default]
    Unknown,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::NotReady => "not-ready",
            Self::Unknown => "unknown",
        })
    }
}

/// Status of an action as reported by its handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStatus {
    /// Current state
    pub state: ActionState,
    /// Handler-specific detail; `detail.message` explains unknown states
    #[serde(default)]
    pub detail: Value,
    /// Outputs readable by dependants
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl ActionStatus {
    /// A ready status with outputs
    #[must_use]
    pub fn ready(outputs: BTreeMap<String, Value>) -> Self {
        Self {
            state: ActionState::Ready,
            detail: Value::Null,
            outputs,
        }
    }

    /// A not-ready status
    #[must_use]
    pub fn not_ready() -> Self {
        Self {
            state: ActionState::NotReady,
            ..Self::default()
        }
    }

    /// An unknown status with an explanatory `detail.message`
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            state: ActionState::Unknown,
            detail: json!({ "message": message.into() }),
            outputs: BTreeMap::new(),
        }
    }

    /// Whether the state is [`ActionState::Ready`]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == ActionState::Ready
    }

    /// `detail.message`, if present
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.detail.get("message").and_then(Value::as_str)
    }
}

/// Everything an action handler gets to work with
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// The configured action
    pub action: Arc<Action>,
    /// The resolved action (version, spec, dependency outputs)
    pub resolved: ResolvedAction,
    /// Statuses of executed dependencies, keyed by task key
    pub dependencies: BTreeMap<String, ActionStatus>,
    /// Active environment
    pub environment: String,
    /// Deploy in sync (hot reload) mode
    pub sync_mode: bool,
    /// Deploy in local mode
    pub local_mode: bool,
}

/// Handles one action type for one kind, e.g. `container` builds
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Provider that must be resolved before actions of this type
    fn provider(&self) -> Option<&str> {
        None
    }

    /// Check whether the action is already in its desired state
    async fn get_status(&self, ctx: &ActionContext) -> Result<ActionStatus> {
        Ok(ActionStatus::unknown(format!(
            "No status handler for {} actions of type '{}'",
            ctx.action.kind, ctx.action.action_type
        )))
    }

    /// Execute the action, returning its new status
    async fn execute(&self, ctx: &ActionContext) -> Result<ActionStatus>;
}

/// Everything a provider handler gets to work with
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Provider configuration
    pub config: ProviderConfig,
    /// Active environment
    pub environment: String,
    /// Resolved providers this provider depends on
    pub dependencies: BTreeMap<String, Provider>,
}

/// Resolves and prepares a provider's environment
#[async_trait]
pub trait ProviderHandler: Send + Sync {
    /// Check whether the environment is ready
    async fn get_environment_status(&self, ctx: &ProviderContext) -> Result<ProviderStatus>;

    /// Bring a not-ready environment up; called only when the status is not ready.
    ///
    /// A status still not ready afterwards fails the resolution.
    async fn prepare_environment(
        &self,
        _ctx: &ProviderContext,
        status: ProviderStatus,
    ) -> Result<ProviderStatus> {
        Ok(status)
    }
}

/// Registered action and provider handlers
#[derive(Default, Clone)]
pub struct PluginRegistry {
    actions: HashMap<(ActionKind, String), Arc<dyn ActionHandler>>,
    providers: HashMap<String, Arc<dyn ProviderHandler>>,
}

impl PluginRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind` actions of `action_type`, replacing any previous one
    pub fn register_action(
        &mut self,
        kind: ActionKind,
        action_type: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) {
        self.actions.insert((kind, action_type.into()), handler);
    }

    /// Register a provider handler, replacing any previous one
    pub fn register_provider(&mut self, name: impl Into<String>, handler: Arc<dyn ProviderHandler>) {
        self.providers.insert(name.into(), handler);
    }

    /// Handler for an action kind and type
    #[must_use]
    pub fn action_handler(&self, kind: ActionKind, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.actions.get(&(kind, action_type.to_string())).cloned()
    }

    /// Handler for a provider
    #[must_use]
    pub fn provider_handler(&self, name: &str) -> Option<Arc<dyn ProviderHandler>> {
        self.providers.get(name).cloned()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<String> = self
            .actions
            .keys()
            .map(|(kind, action_type)| format!("{kind}:{action_type}"))
            .collect();
        actions.sort();
        let mut providers: Vec<&String> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("PluginRegistry")
            .field("actions", &actions)
            .field("providers", &providers)
            .finish()
    }
}
