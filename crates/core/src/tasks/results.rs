//! Results of a solve

use super::{
    Provider, ResolvedAction, Task, TaskOutput, resolve_action_key, resolve_provider_key, task_key,
};
use crate::Error;
use crate::action::ActionRef;
use crate::plugin::ActionStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a task did not produce an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    /// Error category, see [`Error::error_type`]
    pub error_type: String,
    /// Rendered error
    pub message: String,
}

impl From<&Error> for TaskError {
    fn from(err: &Error) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}

/// The outcome of one task
#[derive(Debug, Clone)]
pub struct GraphResult {
    /// Task key
    pub key: String,
    /// The task that ran
    pub task: Task,
    /// Output on success
    pub output: Option<TaskOutput>,
    /// Error on failure or abort
    pub error: Option<TaskError>,
    /// Never ran because a dependency failed
    pub aborted: bool,
    /// When the task's work started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl GraphResult {
    /// A successful result with no timing information
    #[must_use]
    pub fn completed(task: Task, output: TaskOutput) -> Self {
        let now = Utc::now();
        Self {
            key: task.key(),
            task,
            output: Some(output),
            error: None,
            aborted: false,
            started_at: Some(now),
            completed_at: Some(now),
        }
    }

    /// A failed result
    #[must_use]
    pub fn failed(task: Task, error: &Error, started_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key: task.key(),
            task,
            output: None,
            error: Some(error.into()),
            aborted: false,
            started_at,
            completed_at: Some(Utc::now()),
        }
    }

    /// A task that never ran because `dependency` failed
    #[must_use]
    pub fn aborted(task: Task, dependency: &str) -> Self {
        Self {
            key: task.key(),
            task,
            output: None,
            error: Some(TaskError {
                error_type: "aborted".to_string(),
                message: format!("Aborted because dependency '{dependency}' failed"),
            }),
            aborted: true,
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// Whether the task produced an output
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.output.is_some() && self.error.is_none()
    }

    /// Wall time between start and completion
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// Serializable view of a result, for renderers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedResult {
    /// Task key
    pub key: String,
    /// Task type
    #[serde(rename = "type")]
    pub task_type: String,
    /// Task description
    pub description: String,
    /// Whether the task was forced
    pub force: bool,
    /// Output on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Never ran
    pub aborted: bool,
    /// Start time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// Immutable results of a solve, keyed by task key
#[derive(Debug, Clone, Default)]
pub struct GraphResults {
    results: BTreeMap<String, GraphResult>,
}

impl GraphResults {
    /// Collect results; later results replace earlier ones with the same key
    pub fn new(results: impl IntoIterator<Item = GraphResult>) -> Self {
        results.into_iter().collect()
    }

    /// Result for a task key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&GraphResult> {
        self.results.get(key)
    }

    /// Results ordered by key
    pub fn iter(&self) -> impl Iterator<Item = &GraphResult> {
        self.results.values()
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    /// Number of results
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no results
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Status produced by an action's execution task
    #[must_use]
    pub fn action_status(&self, action: &ActionRef) -> Option<&ActionStatus> {
        self.get(&task_key(action.kind, &action.name))?
            .output
            .as_ref()?
            .as_action_status()
    }

    /// Output of an action's resolve-action task
    #[must_use]
    pub fn resolved_action(&self, action: &ActionRef) -> Option<&ResolvedAction> {
        self.get(&resolve_action_key(action.kind, &action.name))?
            .output
            .as_ref()?
            .as_resolved_action()
    }

    /// A resolved provider
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.get(&resolve_provider_key(name))?
            .output
            .as_ref()?
            .as_provider()
    }

    /// Results that failed or were aborted
    pub fn failed(&self) -> impl Iterator<Item = &GraphResult> {
        self.results.values().filter(|r| r.error.is_some())
    }

    /// One error summarizing every failure, if any
    #[must_use]
    pub fn error(&self) -> Option<Error> {
        let failed: Vec<&GraphResult> = self.failed().collect();
        if failed.is_empty() {
            return None;
        }

        let lines: Vec<String> = failed
            .iter()
            .map(|r| {
                let message = r.error.as_ref().map_or("", |e| e.message.as_str());
                format!("- {}: {message}", r.key)
            })
            .collect();
        let errors = failed.iter().filter(|r| !r.aborted).count();
        let aborted = failed.len() - errors;
        Some(Error::graph(
            format!(
                "{errors} task(s) failed, {aborted} aborted:\n{}",
                lines.join("\n")
            ),
            failed.iter().map(|r| r.key.clone()).collect(),
        ))
    }

    /// Serializable summary keyed by task key
    #[must_use]
    pub fn export(&self) -> BTreeMap<String, ExportedResult> {
        self.results
            .iter()
            .map(|(key, r)| {
                (
                    key.clone(),
                    ExportedResult {
                        key: key.clone(),
                        task_type: r.task.task_type().to_string(),
                        description: r.task.description(),
                        force: r.task.force(),
                        output: r.output.clone(),
                        error: r.error.clone(),
                        aborted: r.aborted,
                        started_at: r.started_at,
                        completed_at: r.completed_at,
                        duration_ms: r.duration_ms(),
                    },
                )
            })
            .collect()
    }
}

impl FromIterator<GraphResult> for GraphResults {
    fn from_iter<I: IntoIterator<Item = GraphResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a GraphResults {
    type Item = &'a GraphResult;
    type IntoIter = std::collections::btree_map::Values<'a, String, GraphResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.values()
    }
}
