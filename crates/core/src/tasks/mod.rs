//! Task model
//!
//! A task is one schedulable unit of work inside a solve. There are three
//! kinds, dispatched by [`Task`]:
//!
//! | task | key |
//! |------|-----|
//! | [`ResolveActionTask`] | `resolve-action.<kind>.<name>` |
//! | [`ActionTask`] | `<kind>.<name>` (`build.api`, `deploy.api`, ...) |
//! | [`ResolveProviderTask`] | `resolve-provider.<name>` |
//!
//! Every task has two dependency sets. *Status dependencies* are what must
//! complete before the task can report whether it is already done; *process
//! dependencies* are what must complete before it can actually run. The
//! [`GraphSolver`] checks status first and only expands process dependencies
//! when there is work to do.

mod action;
mod provider;
mod resolve;
mod results;
mod solver;

pub use action::ActionTask;
pub use provider::{Provider, ResolveProviderTask};
pub use resolve::{ResolveActionTask, ResolvedAction};
pub use results::{ExportedResult, GraphResult, GraphResults, TaskError};
pub use solver::{GraphSolver, SolveOptions};

use crate::Result;
use crate::action::{ActionKind, ActionRef};
use crate::plugin::ActionStatus;
use serde::Serialize;

/// Verb of resolve-action task keys
pub const RESOLVE_ACTION_VERB: &str = "resolve-action";

/// Verb of resolve-provider task keys
pub const RESOLVE_PROVIDER_VERB: &str = "resolve-provider";

/// `<kind>.<name>`, the key of an action's execution task
#[must_use]
pub fn task_key(kind: ActionKind, name: &str) -> String {
    format!("{}.{name}", kind.verb())
}

/// `resolve-action.<kind>.<name>`
#[must_use]
pub fn resolve_action_key(kind: ActionKind, name: &str) -> String {
    format!("{RESOLVE_ACTION_VERB}.{}", task_key(kind, name))
}

/// `resolve-provider.<name>`
#[must_use]
pub fn resolve_provider_key(name: &str) -> String {
    format!("{RESOLVE_PROVIDER_VERB}.{name}")
}

/// Any schedulable task
#[derive(Debug, Clone)]
pub enum Task {
    /// Resolve an action's config and static outputs
    ResolveAction(ResolveActionTask),
    /// Check and execute an action
    Action(ActionTask),
    /// Resolve a provider's environment status
    ResolveProvider(ResolveProviderTask),
}

impl Task {
    /// Unique key within a solve
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::ResolveAction(task) => task.key(),
            Self::Action(task) => task.key(),
            Self::ResolveProvider(task) => task.key(),
        }
    }

    /// Task type: `resolve-action`, `resolve-provider` or the action verb
    #[must_use]
    pub fn task_type(&self) -> &'static str {
        match self {
            Self::ResolveAction(_) => RESOLVE_ACTION_VERB,
            Self::Action(task) => task.action().kind.verb(),
            Self::ResolveProvider(_) => RESOLVE_PROVIDER_VERB,
        }
    }

    /// Human-readable description for logs
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::ResolveAction(task) => format!("resolving {}", task.action().reference()),
            Self::Action(task) => format!("{} {}", task.action().kind.verb(), task.action().name),
            Self::ResolveProvider(task) => format!("resolving provider {}", task.name()),
        }
    }

    /// Whether the task runs even when its status is ready
    #[must_use]
    pub fn force(&self) -> bool {
        match self {
            Self::ResolveAction(_) => false,
            Self::Action(task) => task.force,
            Self::ResolveProvider(task) => task.force_refresh,
        }
    }

    /// The action this task belongs to, if any
    #[must_use]
    pub fn action_ref(&self) -> Option<ActionRef> {
        match self {
            Self::ResolveAction(task) => Some(task.action().reference()),
            Self::Action(task) => Some(task.action().reference()),
            Self::ResolveProvider(_) => None,
        }
    }

    /// Tasks that must complete before the status check
    pub fn resolve_status_dependencies(&self) -> Vec<Self> {
        match self {
            Self::ResolveAction(_) | Self::ResolveProvider(_) => Vec::new(),
            Self::Action(task) => task.resolve_status_dependencies(),
        }
    }

    /// Tasks that must complete before processing, given the observed status
    pub fn resolve_process_dependencies(&self, status: Option<&TaskOutput>) -> Result<Vec<Self>> {
        match self {
            Self::ResolveAction(task) => task.resolve_process_dependencies(),
            Self::Action(task) => {
                task.resolve_process_dependencies(status.and_then(TaskOutput::as_action_status))
            }
            Self::ResolveProvider(task) => task.resolve_process_dependencies(),
        }
    }

    /// Current status, or `None` for tasks that must always process
    pub async fn get_status(&self, dependencies: &GraphResults) -> Result<Option<TaskOutput>> {
        match self {
            Self::ResolveAction(_) | Self::ResolveProvider(_) => Ok(None),
            Self::Action(task) => task.get_status(dependencies).await.map(|s| Some(TaskOutput::ActionStatus(s))),
        }
    }

    /// Do the work
    pub async fn process(&self, dependencies: &GraphResults) -> Result<TaskOutput> {
        match self {
            Self::ResolveAction(task) => task.process(dependencies).map(TaskOutput::ResolvedAction),
            Self::Action(task) => task.process(dependencies).await.map(TaskOutput::ActionStatus),
            Self::ResolveProvider(task) => task.process(dependencies).await.map(TaskOutput::Provider),
        }
    }
}

impl From<ActionTask> for Task {
    fn from(task: ActionTask) -> Self {
        Self::Action(task)
    }
}

impl From<ResolveActionTask> for Task {
    fn from(task: ResolveActionTask) -> Self {
        Self::ResolveAction(task)
    }
}

impl From<ResolveProviderTask> for Task {
    fn from(task: ResolveProviderTask) -> Self {
        Self::ResolveProvider(task)
    }
}

/// What a completed task produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum TaskOutput {
    /// From a resolve-action task
    ResolvedAction(ResolvedAction),
    /// From an action task, or an action's status check
    ActionStatus(ActionStatus),
    /// From a resolve-provider task
    Provider(Provider),
}

impl TaskOutput {
    /// Whether the output describes something already in its desired state
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self {
            Self::ResolvedAction(_) => true,
            Self::ActionStatus(status) => status.is_ready(),
            Self::Provider(provider) => provider.status.ready,
        }
    }

    /// The action status, if this is one
    #[must_use]
    pub fn as_action_status(&self) -> Option<&ActionStatus> {
        match self {
            Self::ActionStatus(status) => Some(status),
            _ => None,
        }
    }

    /// The resolved action, if this is one
    #[must_use]
    pub fn as_resolved_action(&self) -> Option<&ResolvedAction> {
        match self {
            Self::ResolvedAction(resolved) => Some(resolved),
            _ => None,
        }
    }

    /// The provider, if this is one
    #[must_use]
    pub fn as_provider(&self) -> Option<&Provider> {
        match self {
            Self::Provider(provider) => Some(provider),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_verb_dot_name() {
        assert_eq!(task_key(ActionKind::Build, "module-a"), "build.module-a");
        assert_eq!(task_key(ActionKind::Deploy, "service-b"), "deploy.service-b");
        assert_eq!(task_key(ActionKind::Run, "task-a"), "run.task-a");
        assert_eq!(task_key(ActionKind::Test, "module-a-integ"), "test.module-a-integ");
        assert_eq!(
            resolve_action_key(ActionKind::Test, "module-a-integ"),
            "resolve-action.test.module-a-integ"
        );
        assert_eq!(resolve_provider_key("exec"), "resolve-provider.exec");
    }

    #[test]
    fn outputs_report_readiness() {
        assert!(TaskOutput::ActionStatus(ActionStatus::ready(Default::default())).is_ready());
        assert!(!TaskOutput::ActionStatus(ActionStatus::not_ready()).is_ready());
    }
}
