//! Action tasks: check and execute builds, deploys, runs and tests

use super::{GraphResults, ResolveActionTask, Task, TaskOutput, resolve_action_key, task_key};
use crate::Result;
use crate::action::{Action, ActionKind, ActionRef};
use crate::garden::Garden;
use crate::plugin::{ActionContext, ActionStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Deploy names matching every deploy
pub const ALL_DEPLOYS: &str = "*";

/// Checks an action's status and executes it when needed
#[derive(Clone)]
pub struct ActionTask {
    garden: Arc<Garden>,
    action: Arc<Action>,
    /// Execute even when the status is ready
    pub force: bool,
    /// Force build dependencies
    pub force_build: bool,
    /// Only schedule build dependencies and resolution, never deploys/runs/tests
    pub skip_runtime_dependencies: bool,
    /// Deploys to run in sync mode (`*` for all)
    pub sync_mode_deploy_names: Vec<String>,
    /// Deploys to run in local mode (`*` for all)
    pub local_mode_deploy_names: Vec<String>,
}

impl ActionTask {
    /// Task for `reference` with default flags; unknown actions are a parameter error
    pub fn new(garden: Arc<Garden>, reference: &ActionRef) -> Result<Self> {
        let action = garden.config_graph().get_action(reference)?;
        Ok(Self::for_action(garden, action))
    }

    pub(crate) fn for_action(garden: Arc<Garden>, action: Arc<Action>) -> Self {
        Self {
            garden,
            action,
            force: false,
            force_build: false,
            skip_runtime_dependencies: false,
            sync_mode_deploy_names: Vec::new(),
            local_mode_deploy_names: Vec::new(),
        }
    }

    /// Builder: set `force`
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Builder: set `force_build`
    #[must_use]
    pub fn with_force_build(mut self, force_build: bool) -> Self {
        self.force_build = force_build;
        self
    }

    /// Builder: set `skip_runtime_dependencies`
    #[must_use]
    pub fn with_skip_runtime_dependencies(mut self, skip: bool) -> Self {
        self.skip_runtime_dependencies = skip;
        self
    }

    /// Builder: deploys to run in sync mode
    #[must_use]
    pub fn with_sync_mode_deploys(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.sync_mode_deploy_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: deploys to run in local mode
    #[must_use]
    pub fn with_local_mode_deploys(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.local_mode_deploy_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// `<kind>.<name>`
    #[must_use]
    pub fn key(&self) -> String {
        task_key(self.action.kind, &self.action.name)
    }

    /// The action
    #[must_use]
    pub fn action(&self) -> &Arc<Action> {
        &self.action
    }

    /// Only the action's own resolution is needed to check its status
    #[must_use]
    pub fn resolve_status_dependencies(&self) -> Vec<Task> {
        vec![self.resolve_task().into()]
    }

    /// Tasks needed to execute the action, given its last known status.
    ///
    /// A ready status without `force` needs nothing but the action's own
    /// resolution. Otherwise build dependencies run as build tasks (forced
    /// when `force_build` is set) and runtime dependencies as deploy, run or
    /// test tasks. Runtime dependencies that are disabled, or skipped through
    /// `skip_runtime_dependencies`, are only resolved, and only when their
    /// outputs are read.
    pub fn resolve_process_dependencies(&self, status: Option<&ActionStatus>) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = vec![self.resolve_task().into()];

        if status.is_some_and(ActionStatus::is_ready) && !self.force {
            return Ok(tasks);
        }

        for (dependency, action) in self.garden.config_graph().dependencies(&self.action.reference())? {
            if action.kind == ActionKind::Build {
                if action.disabled {
                    tracing::debug!(
                        task = %self.key(),
                        dependency = %action.reference(),
                        "Skipping disabled build dependency"
                    );
                    continue;
                }
                tasks.push(self.dependency_task(action, self.force_build).into());
            } else if self.skip_runtime_dependencies || action.disabled {
                if dependency.needs_outputs() {
                    tasks.push(ResolveActionTask::for_action(Arc::clone(&self.garden), action).into());
                }
            } else {
                tasks.push(self.dependency_task(action, false).into());
            }
        }

        Ok(tasks)
    }

    /// Ask the plugin for the action's current status
    pub async fn get_status(&self, dependencies: &GraphResults) -> Result<ActionStatus> {
        if self.action.disabled {
            return Ok(ActionStatus::unknown(format!(
                "Action '{}' is disabled",
                self.action.reference()
            )));
        }
        let Some(handler) = self.handler() else {
            return Ok(self.missing_handler_status("getStatus"));
        };

        let ctx = self.context(dependencies)?;
        let status = handler.get_status(&ctx).await?;
        tracing::debug!(task = %self.key(), state = %status.state, "Got action status");
        Ok(status)
    }

    /// Execute the action through its plugin
    pub async fn process(&self, dependencies: &GraphResults) -> Result<ActionStatus> {
        if self.action.disabled {
            tracing::info!(task = %self.key(), "Action is disabled, not executing");
            return Ok(ActionStatus::unknown(format!(
                "Action '{}' is disabled",
                self.action.reference()
            )));
        }
        let Some(handler) = self.handler() else {
            return Ok(self.missing_handler_status(self.action.kind.verb()));
        };

        let ctx = self.context(dependencies)?;
        tracing::info!(
            task = %self.key(),
            version = %ctx.resolved.version,
            force = self.force,
            sync_mode = ctx.sync_mode,
            local_mode = ctx.local_mode,
            "Executing action"
        );
        let status = handler.execute(&ctx).await?;
        tracing::info!(task = %self.key(), state = %status.state, "Action executed");
        Ok(status)
    }

    fn resolve_task(&self) -> ResolveActionTask {
        ResolveActionTask::for_action(Arc::clone(&self.garden), Arc::clone(&self.action))
    }

    fn dependency_task(&self, action: Arc<Action>, force: bool) -> Self {
        Self {
            garden: Arc::clone(&self.garden),
            action,
            force,
            force_build: self.force_build,
            skip_runtime_dependencies: self.skip_runtime_dependencies,
            sync_mode_deploy_names: self.sync_mode_deploy_names.clone(),
            local_mode_deploy_names: self.local_mode_deploy_names.clone(),
        }
    }

    fn handler(&self) -> Option<Arc<dyn crate::plugin::ActionHandler>> {
        self.garden
            .plugins()
            .action_handler(self.action.kind, &self.action.action_type)
    }

    fn missing_handler_status(&self, handler: &str) -> ActionStatus {
        ActionStatus::unknown(format!(
            "No {handler} handler available for {} action type '{}'",
            self.action.kind.verb(),
            self.action.action_type
        ))
    }

    fn deploy_mode(&self, names: &[String]) -> bool {
        self.action.kind == ActionKind::Deploy
            && names
                .iter()
                .any(|n| n == ALL_DEPLOYS || n == &self.action.name)
    }

    fn context(&self, dependencies: &GraphResults) -> Result<ActionContext> {
        let resolved_key = resolve_action_key(self.action.kind, &self.action.name);
        let resolved = match dependencies
            .get(&resolved_key)
            .and_then(|r| r.output.as_ref())
            .and_then(TaskOutput::as_resolved_action)
        {
            Some(resolved) => resolved.clone(),
            // Called outside a solve; resolve in place.
            None => self.resolve_task().process(dependencies)?,
        };

        let executed: BTreeMap<String, ActionStatus> = dependencies
            .iter()
            .filter(|r| r.key != resolved_key)
            .filter_map(|r| {
                r.output
                    .as_ref()
                    .and_then(TaskOutput::as_action_status)
                    .map(|s| (r.key.clone(), s.clone()))
            })
            .collect();

        Ok(ActionContext {
            action: Arc::clone(&self.action),
            resolved,
            dependencies: executed,
            environment: self.garden.environment().to_string(),
            sync_mode: self.deploy_mode(&self.sync_mode_deploy_names),
            local_mode: self.deploy_mode(&self.local_mode_deploy_names),
        })
    }
}

impl fmt::Debug for ActionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionTask")
            .field("key", &self.key())
            .field("force", &self.force)
            .field("force_build", &self.force_build)
            .field("skip_runtime_dependencies", &self.skip_runtime_dependencies)
            .field("sync_mode_deploy_names", &self.sync_mode_deploy_names)
            .field("local_mode_deploy_names", &self.local_mode_deploy_names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDependency;
    use crate::plugin::{ActionState, PluginRegistry};
    use crate::test_utils::{StaticActionHandler, garden_with, garden_with_plugins, scenario_actions};
    use serde_json::json;

    fn task(garden: &Arc<Garden>, reference: &str) -> ActionTask {
        ActionTask::new(Arc::clone(garden), &reference.parse().unwrap()).unwrap()
    }

    fn sorted_keys(tasks: &[Task]) -> Vec<String> {
        let mut keys: Vec<String> = tasks.iter().map(Task::key).collect();
        keys.sort();
        keys
    }

    #[test]
    fn status_dependencies_are_own_resolution() {
        let garden = garden_with(scenario_actions());
        let deps = task(&garden, "test.test-b").resolve_status_dependencies();
        assert_eq!(sorted_keys(&deps), vec!["resolve-action.test.test-b"]);
    }

    #[test]
    fn process_dependencies_include_build_and_runtime_dependencies() {
        let garden = garden_with(scenario_actions());
        let deps = task(&garden, "test.test-b")
            .resolve_process_dependencies(None)
            .unwrap();
        assert_eq!(
            sorted_keys(&deps),
            vec![
                "build.module-a",
                "deploy.service-b",
                "resolve-action.test.test-b",
                "run.task-a",
                "test.module-a-integ",
            ]
        );
    }

    #[test]
    fn ready_status_short_circuits() {
        let garden = garden_with(scenario_actions());
        let status = ActionStatus::ready(BTreeMap::new());
        let deps = task(&garden, "test.module-a-integ")
            .resolve_process_dependencies(Some(&status))
            .unwrap();
        assert_eq!(sorted_keys(&deps), vec!["resolve-action.test.module-a-integ"]);
    }

    #[test]
    fn force_ignores_ready_status() {
        let garden = garden_with(scenario_actions());
        let status = ActionStatus::ready(BTreeMap::new());
        let deps = task(&garden, "test.module-a-integ")
            .with_force(true)
            .resolve_process_dependencies(Some(&status))
            .unwrap();
        assert_eq!(
            sorted_keys(&deps),
            vec!["build.module-a", "resolve-action.test.module-a-integ"]
        );
    }

    #[test]
    fn not_ready_status_expands_dependencies() {
        let garden = garden_with(scenario_actions());
        let deps = task(&garden, "run.task-a")
            .resolve_process_dependencies(Some(&ActionStatus::not_ready()))
            .unwrap();
        assert_eq!(
            sorted_keys(&deps),
            vec!["deploy.service-a", "resolve-action.run.task-a"]
        );
    }

    #[test]
    fn skip_runtime_dependencies_keeps_builds_only() {
        let garden = garden_with(scenario_actions());
        let deps = task(&garden, "test.test-b")
            .with_skip_runtime_dependencies(true)
            .resolve_process_dependencies(None)
            .unwrap();
        let keys = sorted_keys(&deps);
        assert_eq!(keys, vec!["build.module-a", "resolve-action.test.test-b"]);
        assert!(keys.iter().all(|k| k.starts_with("build.") || k.starts_with("resolve-action.")));
    }

    #[test]
    fn skipped_runtime_dependencies_with_outputs_are_resolved() {
        let garden = garden_with(vec![
            Action::new(ActionKind::Deploy, "db", "container"),
            Action::new(ActionKind::Test, "e2e", "exec").with_dependency(ActionDependency {
                action: "deploy.db".parse().unwrap(),
                explicit: true,
                needs_static_outputs: true,
                needs_executed_outputs: false,
            }),
        ]);
        let deps = task(&garden, "test.e2e")
            .with_skip_runtime_dependencies(true)
            .resolve_process_dependencies(None)
            .unwrap();
        assert_eq!(
            sorted_keys(&deps),
            vec!["resolve-action.deploy.db", "resolve-action.test.e2e"]
        );
    }

    #[test]
    fn disabled_dependencies_are_not_executed() {
        let garden = garden_with(vec![
            Action::new(ActionKind::Build, "base", "container").disabled(),
            Action::new(ActionKind::Deploy, "db", "container").disabled(),
            Action::new(ActionKind::Deploy, "cache", "container").disabled(),
            Action::new(ActionKind::Deploy, "api", "container")
                .with_dependency(ActionDependency::new("build.base".parse().unwrap()))
                .with_dependency(ActionDependency::new("deploy.db".parse().unwrap()))
                .with_dependency(ActionDependency {
                    action: "deploy.cache".parse().unwrap(),
                    explicit: true,
                    needs_static_outputs: false,
                    needs_executed_outputs: true,
                }),
        ]);
        let deps = task(&garden, "deploy.api").resolve_process_dependencies(None).unwrap();
        assert_eq!(
            sorted_keys(&deps),
            vec!["resolve-action.deploy.api", "resolve-action.deploy.cache"]
        );
    }

    #[test]
    fn force_build_forces_build_dependencies_only() {
        let garden = garden_with(scenario_actions());
        let deps = task(&garden, "test.test-b")
            .with_force_build(true)
            .resolve_process_dependencies(None)
            .unwrap();

        for dep in &deps {
            match dep.key().as_str() {
                "build.module-a" => assert!(dep.force()),
                _ => assert!(!dep.force(), "{} should not be forced", dep.key()),
            }
        }
    }

    #[tokio::test]
    async fn missing_handler_reports_unknown_state() {
        let garden = garden_with(scenario_actions());
        let build = task(&garden, "build.module-a");

        let status = build.get_status(&GraphResults::default()).await.unwrap();
        assert_eq!(status.state, ActionState::Unknown);
        assert!(status.message().unwrap().contains("container"));

        let processed = build.process(&GraphResults::default()).await.unwrap();
        assert_eq!(processed.state, ActionState::Unknown);
        assert!(processed.message().is_some());
    }

    #[tokio::test]
    async fn handler_status_and_execute_are_called() {
        let handler = Arc::new(StaticActionHandler::not_ready());
        let mut plugins = PluginRegistry::new();
        plugins.register_action(ActionKind::Build, "container", handler.clone());
        let garden = garden_with_plugins(scenario_actions(), plugins);
        let build = task(&garden, "build.module-a");

        let status = build.get_status(&GraphResults::default()).await.unwrap();
        assert_eq!(status.state, ActionState::NotReady);

        let processed = build.process(&GraphResults::default()).await.unwrap();
        assert!(processed.is_ready());
        assert_eq!(processed.outputs.get("executed"), Some(&json!("build.module-a")));
        assert_eq!(handler.executions(), vec!["build.module-a"]);
    }

    #[tokio::test]
    async fn deploy_modes_follow_name_lists() {
        let handler = Arc::new(StaticActionHandler::ready());
        let mut plugins = PluginRegistry::new();
        plugins.register_action(ActionKind::Deploy, "container", handler.clone());
        let garden = garden_with_plugins(scenario_actions(), plugins);

        task(&garden, "deploy.service-a")
            .with_sync_mode_deploys(["service-a"])
            .with_local_mode_deploys(["service-b"])
            .process(&GraphResults::default())
            .await
            .unwrap();
        task(&garden, "deploy.service-b")
            .with_sync_mode_deploys([ALL_DEPLOYS])
            .process(&GraphResults::default())
            .await
            .unwrap();

        let modes = handler.modes();
        assert_eq!(modes.get("deploy.service-a"), Some(&(true, false)));
        assert_eq!(modes.get("deploy.service-b"), Some(&(true, false)));
    }

    #[tokio::test]
    async fn disabled_actions_are_not_executed() {
        let handler = Arc::new(StaticActionHandler::ready());
        let mut plugins = PluginRegistry::new();
        plugins.register_action(ActionKind::Run, "exec", handler.clone());
        let garden = garden_with_plugins(
            vec![Action::new(ActionKind::Run, "off", "exec").disabled()],
            plugins,
        );

        let status = task(&garden, "run.off").process(&GraphResults::default()).await.unwrap();
        assert_eq!(status.state, ActionState::Unknown);
        assert!(handler.executions().is_empty());
    }
}
