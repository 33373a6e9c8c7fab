//! Concurrent task graph solver
//!
//! The solver grows a [`DependencyGraph`] of task keys while it runs. Each
//! task first waits for its status dependencies, then reports its status.
//! Tasks that are already done complete right away; the rest expand their
//! process dependencies and are processed once those finish. Work is spread
//! over a [`JoinSet`] bounded by the project's `max_parallel` setting.

use super::{GraphResult, GraphResults, Task, TaskOutput};
use crate::garden::Garden;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use garden_graph::DependencyGraph;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::task::{Id, JoinSet};

/// Options for one solve
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveOptions {
    /// Complete every task with a known status, without processing it
    pub status_only: bool,
    /// Return an error when any task fails
    pub throw_on_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingStatus,
    CheckingStatus,
    AwaitingProcess,
    Processing,
    Done,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Status,
    Process,
}

#[derive(Debug)]
struct Node {
    task: Task,
    phase: Phase,
    status_dependencies: Vec<String>,
    process_dependencies: Vec<String>,
    /// Dependencies of the current phase that have not finished yet
    pending: usize,
    started_at: Option<DateTime<Utc>>,
    /// Root failure that prevents this node from completing
    failed_root: Option<String>,
}

impl Node {
    fn new(task: Task) -> Self {
        Self {
            task,
            phase: Phase::AwaitingStatus,
            status_dependencies: Vec::new(),
            process_dependencies: Vec::new(),
            pending: 0,
            started_at: None,
            failed_root: None,
        }
    }

    const fn is_waiting(&self) -> bool {
        matches!(self.phase, Phase::AwaitingStatus | Phase::AwaitingProcess)
    }

    fn waiting_on(&self) -> &[String] {
        match self.phase {
            Phase::AwaitingStatus => &self.status_dependencies,
            Phase::AwaitingProcess => &self.process_dependencies,
            _ => &[],
        }
    }
}

struct StepOutcome {
    key: String,
    step: Step,
    result: Result<Option<TaskOutput>>,
}

/// Mutable bookkeeping for one solve
#[derive(Default)]
struct SolveState {
    graph: DependencyGraph,
    nodes: HashMap<String, Node>,
    results: HashMap<String, GraphResult>,
    /// Unfinished dependency key to the nodes waiting on it
    waiters: HashMap<String, Vec<String>>,
    /// Nodes whose current phase has all dependencies done, in the order
    /// they became runnable
    ready: VecDeque<String>,
}

impl SolveState {
    /// Register a task and, recursively, its status dependencies. Returns the
    /// task's key. A key that is already registered keeps its first task.
    fn add_task(&mut self, task: Task) -> Result<String> {
        let key = task.key();
        if self.nodes.contains_key(&key) {
            return Ok(key);
        }

        self.graph.add_node(&key);
        let dependencies = task.resolve_status_dependencies();
        // Register first so self-references terminate
        self.nodes.insert(key.clone(), Node::new(task));

        let mut keys = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let dependency_key = self.add_task(dependency)?;
            self.add_edge(&key, &dependency_key)?;
            keys.push(dependency_key);
        }
        if let Some(node) = self.nodes.get_mut(&key) {
            node.status_dependencies = keys;
        }
        self.wait(&key);
        Ok(key)
    }

    /// Record `from -> to`. The graph is acyclic before the edge, so the edge
    /// closes a loop exactly when `to` already depends on `from`.
    fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if self.graph.add_dependency(from, to) && self.graph.depends_on(to, from) {
            return Err(garden_graph::Error::CycleDetected {
                cycles: self.graph.detect_circular_dependencies(),
            }
            .into());
        }
        Ok(())
    }

    /// Count the unfinished dependencies of `key`'s current phase. Queues the
    /// node when there are none, or aborts it when one already failed.
    fn wait(&mut self, key: &str) {
        let Some(dependencies) = self.nodes.get(key).map(|node| node.waiting_on().to_vec()) else {
            return;
        };
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for dependency in dependencies {
            if !seen.insert(dependency.clone()) {
                continue;
            }
            match self.nodes.get(&dependency) {
                Some(dep) if dep.phase == Phase::Done => {
                    if let Some(root) = dep.failed_root.clone() {
                        tracing::warn!(task = %key, dependency = %root, "Aborting task, dependency failed");
                        self.abort(key, root);
                        self.release(key);
                        return;
                    }
                }
                _ => pending.push(dependency),
            }
        }

        if let Some(node) = self.nodes.get_mut(key) {
            node.pending = pending.len();
        }
        if pending.is_empty() {
            self.ready.push_back(key.to_string());
        }
        for dependency in pending {
            self.waiters.entry(dependency).or_default().push(key.to_string());
        }
    }

    /// Wake the nodes waiting on a node that just finished. Waiters of a
    /// failed node are aborted, and so on down their own waiters.
    fn release(&mut self, key: &str) {
        let mut finished = vec![key.to_string()];
        while let Some(done) = finished.pop() {
            let root = self.nodes.get(&done).and_then(|n| n.failed_root.clone());
            for waiter in self.waiters.remove(&done).unwrap_or_default() {
                let Some(node) = self.nodes.get_mut(&waiter) else {
                    continue;
                };
                if !node.is_waiting() {
                    continue;
                }
                if let Some(root) = &root {
                    tracing::warn!(task = %waiter, dependency = %root, "Aborting task, dependency failed");
                    self.abort(&waiter, root.clone());
                    finished.push(waiter);
                } else {
                    node.pending = node.pending.saturating_sub(1);
                    if node.pending == 0 {
                        self.ready.push_back(waiter);
                    }
                }
            }
        }
    }

    /// Dependency results handed to a step: everything the node depends on
    fn dependency_results(&self, node: &Node) -> GraphResults {
        node.status_dependencies
            .iter()
            .chain(&node.process_dependencies)
            .filter_map(|key| self.results.get(key).cloned())
            .collect()
    }

    fn complete(&mut self, key: &str, output: TaskOutput) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.phase = Phase::Done;
            let mut result = GraphResult::completed(node.task.clone(), output);
            result.started_at = node.started_at;
            self.results.insert(key.to_string(), result);
        }
        self.release(key);
    }

    fn fail(&mut self, key: &str, error: &Error) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.phase = Phase::Done;
            node.failed_root = Some(key.to_string());
            let result = GraphResult::failed(node.task.clone(), error, node.started_at);
            self.results.insert(key.to_string(), result);
        }
        self.release(key);
    }

    fn abort(&mut self, key: &str, root: String) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.phase = Phase::Done;
            let result = GraphResult::aborted(node.task.clone(), &root);
            node.failed_root = Some(root);
            self.results.insert(key.to_string(), result);
        }
    }

    /// Start queued steps while the concurrency window allows
    fn schedule(
        &mut self,
        join_set: &mut JoinSet<StepOutcome>,
        in_flight: &mut HashMap<Id, (String, Step)>,
        max_parallel: usize,
    ) {
        while max_parallel == 0 || join_set.len() < max_parallel {
            let Some(key) = self.ready.pop_front() else {
                break;
            };
            let Some(node) = self.nodes.get(&key) else {
                continue;
            };
            if !node.is_waiting() {
                continue;
            }

            let dependencies = self.dependency_results(node);
            let Some(node) = self.nodes.get_mut(&key) else {
                continue;
            };
            let task = node.task.clone();
            let step = if node.phase == Phase::AwaitingStatus {
                node.phase = Phase::CheckingStatus;
                Step::Status
            } else {
                node.phase = Phase::Processing;
                Step::Process
            };
            if node.started_at.is_none() {
                node.started_at = Some(Utc::now());
            }

            match step {
                Step::Status => tracing::debug!(task = %key, "Checking task status"),
                Step::Process => tracing::info!(task = %key, "Starting task"),
            }
            let task_key = key.clone();
            let handle = join_set.spawn(async move {
                let result = match step {
                    Step::Status => task.get_status(&dependencies).await,
                    Step::Process => task.process(&dependencies).await.map(Some),
                };
                StepOutcome {
                    key: task_key,
                    step,
                    result,
                }
            });
            in_flight.insert(handle.id(), (key, step));
        }
    }

    fn handle_outcome(&mut self, outcome: StepOutcome, options: SolveOptions) -> Result<()> {
        let StepOutcome { key, step, result } = outcome;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                tracing::error!(task = %key, ?step, error = %err, "Task failed");
                self.fail(&key, &err);
                return Ok(());
            }
        };

        match (step, output) {
            (Step::Process, Some(output)) => {
                tracing::info!(task = %key, "Task completed");
                self.complete(&key, output);
            }
            (Step::Process, None) => {
                self.fail(&key, &Error::configuration(format!("Task '{key}' produced no output")));
            }
            (Step::Status, status) => {
                let Some(node) = self.nodes.get(&key) else {
                    return Ok(());
                };
                let force = node.task.force();
                if let Some(status) = status {
                    if options.status_only || (status.is_ready() && !force) {
                        tracing::debug!(task = %key, ready = status.is_ready(), "Task complete from status");
                        self.complete(&key, status);
                        return Ok(());
                    }
                    self.expand(&key, Some(&status))?;
                } else {
                    self.expand(&key, None)?;
                }
            }
        }
        Ok(())
    }

    /// Register the process dependencies of `key` for its observed status
    fn expand(&mut self, key: &str, status: Option<&TaskOutput>) -> Result<()> {
        let Some(node) = self.nodes.get(key) else {
            return Ok(());
        };
        let dependencies = match node.task.resolve_process_dependencies(status) {
            Ok(dependencies) => dependencies,
            Err(err) => {
                tracing::error!(task = %key, error = %err, "Failed to resolve task dependencies");
                self.fail(key, &err);
                return Ok(());
            }
        };

        let mut keys = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let dependency_key = self.add_task(dependency)?;
            self.add_edge(key, &dependency_key)?;
            keys.push(dependency_key);
        }
        tracing::debug!(
            task = %key,
            dependencies = ?keys,
            "Expanded process dependencies"
        );

        if let Some(node) = self.nodes.get_mut(key) {
            node.process_dependencies = keys;
            node.phase = Phase::AwaitingProcess;
        }
        self.wait(key);
        Ok(())
    }

    fn unfinished(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.phase != Phase::Done)
            .map(|(key, _)| key.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }
}

/// Runs tasks and their dependencies for one [`Garden`]
#[derive(Debug, Clone)]
pub struct GraphSolver {
    garden: Arc<Garden>,
}

impl GraphSolver {
    /// Solver bound to a garden
    #[must_use]
    pub const fn new(garden: Arc<Garden>) -> Self {
        Self { garden }
    }

    /// Run `tasks` and everything they depend on.
    ///
    /// Returns results for every task that was part of the solve, requested
    /// or not.
    ///
    /// # Errors
    ///
    /// Fails when the task graph is cyclic, or when a task fails and
    /// `throw_on_error` is set. Individual task failures are otherwise
    /// recorded in the returned [`GraphResults`].
    #[tracing::instrument(
        name = "solve",
        skip_all,
        fields(correlation_id = %crate::tracing::correlation_id())
    )]
    pub async fn solve(&self, tasks: Vec<Task>, options: SolveOptions) -> Result<GraphResults> {
        let max_parallel = self.garden.max_parallel();
        tracing::info!(
            tasks = tasks.len(),
            max_parallel,
            status_only = options.status_only,
            "Solving task graph"
        );

        let mut state = SolveState::default();
        for task in tasks {
            state.add_task(task)?;
        }

        let mut join_set: JoinSet<StepOutcome> = JoinSet::new();
        let mut in_flight: HashMap<Id, (String, Step)> = HashMap::new();

        loop {
            state.schedule(&mut join_set, &mut in_flight, max_parallel);

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };
            let outcome = match joined {
                Ok((id, outcome)) => {
                    in_flight.remove(&id);
                    outcome
                }
                Err(err) => {
                    let Some((key, step)) = in_flight.remove(&err.id()) else {
                        return Err(Error::configuration(format!("Task panicked: {err}")));
                    };
                    StepOutcome {
                        key,
                        step,
                        result: Err(Error::configuration(format!("Task panicked: {err}"))),
                    }
                }
            };
            state.handle_outcome(outcome, options)?;
        }

        let unfinished = state.unfinished();
        if !unfinished.is_empty() {
            return Err(Error::graph(
                format!("Tasks could not be scheduled: {}", unfinished.join(", ")),
                unfinished.iter().map(ToString::to_string).collect(),
            ));
        }

        let results = GraphResults::new(state.results.into_values());
        let failed = results.failed().count();
        tracing::info!(tasks = results.len(), failed, "Task graph solved");

        if options.throw_on_error
            && let Some(err) = results.error()
        {
            return Err(err);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::plugin::{ActionState, PluginRegistry};
    use crate::tasks::ActionTask;
    use crate::test_utils::{StaticActionHandler, garden_with_plugins, scenario_actions};

    fn scenario(handler: &Arc<StaticActionHandler>) -> Arc<Garden> {
        let mut plugins = PluginRegistry::new();
        plugins.register_action(ActionKind::Build, "container", handler.clone());
        plugins.register_action(ActionKind::Deploy, "container", handler.clone());
        plugins.register_action(ActionKind::Run, "exec", handler.clone());
        plugins.register_action(ActionKind::Test, "exec", handler.clone());
        garden_with_plugins(scenario_actions(), plugins)
    }

    fn action(garden: &Arc<Garden>, reference: &str) -> ActionTask {
        ActionTask::new(Arc::clone(garden), &reference.parse().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn solves_full_dependency_tree() {
        let handler = Arc::new(StaticActionHandler::not_ready());
        let garden = scenario(&handler);
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(vec![action(&garden, "test.test-b").into()], SolveOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 12);
        assert!(results.failed().next().is_none());
        for key in [
            "build.module-a",
            "deploy.service-a",
            "deploy.service-b",
            "run.task-a",
            "test.module-a-integ",
            "test.test-b",
        ] {
            let result = results.get(key).unwrap();
            assert!(result.succeeded(), "{key} should succeed");
            assert!(results.get(&format!("resolve-action.{key}")).is_some());
        }

        let executions = handler.executions();
        assert_eq!(executions.len(), 6);
        assert_eq!(executions.first().map(String::as_str), Some("build.module-a"));
        assert_eq!(executions.last().map(String::as_str), Some("test.test-b"));
        let position = |key: &str| executions.iter().position(|k| k == key).unwrap();
        assert!(position("deploy.service-a") < position("run.task-a"));
    }

    #[tokio::test]
    async fn ready_tasks_complete_from_status() {
        let handler = Arc::new(StaticActionHandler::ready());
        let garden = scenario(&handler);
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(vec![action(&garden, "test.test-b").into()], SolveOptions::default())
            .await
            .unwrap();

        assert_eq!(
            results.keys().collect::<Vec<_>>(),
            vec!["resolve-action.test.test-b", "test.test-b"]
        );
        assert!(handler.executions().is_empty());
        assert_eq!(
            results.action_status(&"test.test-b".parse().unwrap()).unwrap().state,
            ActionState::Ready
        );
    }

    #[tokio::test]
    async fn status_only_never_processes() {
        let handler = Arc::new(StaticActionHandler::not_ready());
        let garden = scenario(&handler);
        let options = SolveOptions {
            status_only: true,
            ..SolveOptions::default()
        };
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(vec![action(&garden, "deploy.service-a").into()], options)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(handler.executions().is_empty());
        assert_eq!(
            results.action_status(&"deploy.service-a".parse().unwrap()).unwrap().state,
            ActionState::NotReady
        );
    }

    #[tokio::test]
    async fn forced_task_runs_despite_ready_status() {
        let handler = Arc::new(StaticActionHandler::ready());
        let garden = scenario(&handler);
        let task = action(&garden, "deploy.service-b").with_force(true);
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(vec![task.into()], SolveOptions::default())
            .await
            .unwrap();

        assert_eq!(handler.executions(), vec!["deploy.service-b"]);
        // The build dependency was ready, so it completed without executing.
        assert!(results.get("build.module-a").unwrap().succeeded());
    }

    #[tokio::test]
    async fn force_build_reaches_build_dependencies() {
        let handler = Arc::new(StaticActionHandler::not_ready());
        let garden = scenario(&handler);
        let task = action(&garden, "deploy.service-a").with_force_build(true);
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(vec![task.into()], SolveOptions::default())
            .await
            .unwrap();

        assert!(results.get("build.module-a").unwrap().task.force());
        assert!(!results.get("deploy.service-a").unwrap().task.force());
    }

    #[tokio::test]
    async fn first_registration_of_a_key_wins() {
        let handler = Arc::new(StaticActionHandler::ready());
        let garden = scenario(&handler);
        let results = GraphSolver::new(Arc::clone(&garden))
            .solve(
                vec![
                    action(&garden, "build.module-a").into(),
                    action(&garden, "build.module-a").with_force(true).into(),
                ],
                SolveOptions::default(),
            )
            .await
            .unwrap();

        assert!(!results.get("build.module-a").unwrap().task.force());
        assert!(handler.executions().is_empty());
    }

    #[test]
    fn edge_closing_a_loop_is_a_configuration_error() {
        let mut state = SolveState::default();
        state.add_edge("a", "b").unwrap();
        state.add_edge("b", "c").unwrap();
        // Re-adding an existing edge is fine
        state.add_edge("a", "b").unwrap();

        let err = state.add_edge("c", "a").unwrap_err();
        assert_eq!(err.error_type(), "configuration");
        assert!(err.to_string().contains("Circular dependencies detected"));
    }

    #[tokio::test]
    async fn empty_solve_is_empty() {
        let handler = Arc::new(StaticActionHandler::ready());
        let results = GraphSolver::new(scenario(&handler))
            .solve(Vec::new(), SolveOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
