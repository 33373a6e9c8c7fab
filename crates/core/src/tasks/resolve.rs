//! Resolve-action tasks

use super::{ActionTask, GraphResults, ResolveProviderTask, Task, TaskOutput, resolve_action_key};
use crate::action::{Action, ActionKind, ActionRef};
use crate::garden::Garden;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An action with its configuration resolved for one solve
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAction {
    /// The resolved action
    pub action: ActionRef,
    /// Action type
    #[serde(rename = "type")]
    pub action_type: String,
    /// Version string of the configuration
    pub version: String,
    /// Resolved spec
    pub spec: Value,
    /// Outputs known without executing the action
    pub static_outputs: BTreeMap<String, Value>,
    /// Outputs of dependencies this action reads, keyed by task key
    pub dependency_outputs: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Resolves an action's config; every execution of the action depends on it
#[derive(Clone)]
pub struct ResolveActionTask {
    garden: Arc<Garden>,
    action: Arc<Action>,
}

impl ResolveActionTask {
    /// Task for `reference`; unknown actions are a parameter error
    pub fn new(garden: Arc<Garden>, reference: &ActionRef) -> Result<Self> {
        let action = garden.config_graph().get_action(reference)?;
        Ok(Self { garden, action })
    }

    pub(crate) fn for_action(garden: Arc<Garden>, action: Arc<Action>) -> Self {
        Self { garden, action }
    }

    /// `resolve-action.<kind>.<name>`
    #[must_use]
    pub fn key(&self) -> String {
        resolve_action_key(self.action.kind, &self.action.name)
    }

    /// The action being resolved
    #[must_use]
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Dependencies whose outputs this action reads, plus its plugin's provider.
    ///
    /// Executed outputs require the dependency to run; static outputs only
    /// require it to be resolved. Disabled dependencies are only resolved.
    pub fn resolve_process_dependencies(&self) -> Result<Vec<Task>> {
        let graph = self.garden.config_graph();
        let mut tasks = Vec::new();

        for (dependency, action) in graph.dependencies(&self.action.reference())? {
            if dependency.needs_executed_outputs && !action.disabled {
                tasks.push(ActionTask::for_action(Arc::clone(&self.garden), action).into());
            } else if dependency.needs_outputs() {
                tasks.push(Self::for_action(Arc::clone(&self.garden), action).into());
            }
        }

        let handler = self
            .garden
            .plugins()
            .action_handler(self.action.kind, &self.action.action_type);
        if let Some(provider) = handler.as_ref().and_then(|h| h.provider()) {
            let config = self.garden.provider_config(provider).map_err(|_| {
                Error::configuration(format!(
                    "Action '{}' of type '{}' requires provider '{provider}', which is not configured for environment '{}'",
                    self.action.reference(),
                    self.action.action_type,
                    self.garden.environment()
                ))
            })?;
            tasks.push(ResolveProviderTask::new(Arc::clone(&self.garden), config.clone(), false).into());
        }

        Ok(tasks)
    }

    /// Resolve the action against its dependency results
    pub fn process(&self, dependencies: &GraphResults) -> Result<ResolvedAction> {
        let mut dependency_outputs = BTreeMap::new();
        for result in dependencies.iter() {
            let Some(output) = &result.output else {
                continue;
            };
            let outputs = match output {
                TaskOutput::ActionStatus(status) => status.outputs.clone(),
                TaskOutput::ResolvedAction(resolved) => resolved.static_outputs.clone(),
                TaskOutput::Provider(provider) => provider.status.outputs.clone(),
            };
            dependency_outputs.insert(result.key.clone(), outputs);
        }

        let version = self.action.version_string();
        let mut static_outputs = BTreeMap::new();
        static_outputs.insert("version".to_string(), Value::String(version.clone()));
        if self.action.kind == ActionKind::Build {
            static_outputs.insert(
                "buildName".to_string(),
                Value::String(self.action.name.clone()),
            );
        }

        tracing::debug!(
            action = %self.action.reference(),
            version = %version,
            dependencies = dependency_outputs.len(),
            "Resolved action"
        );

        Ok(ResolvedAction {
            action: self.action.reference(),
            action_type: self.action.action_type.clone(),
            version,
            spec: self.action.spec.clone(),
            static_outputs,
            dependency_outputs,
        })
    }
}

impl fmt::Debug for ResolveActionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveActionTask")
            .field("key", &self.key())
            .finish()
    }
}
