//! Actions and the validated action graph
//!
//! An [`Action`] is a unit of project work (build a container, deploy a
//! service, run a task, run a test suite). Actions reference each other by
//! [`ActionRef`] (`<kind>.<name>`); the [`ConfigGraph`] owns every action of a
//! project and guarantees those references are valid and acyclic.

use crate::{Error, Result};
use garden_graph::{DependencyEdge, DependencyGraph, detect_cycles, format_cycle};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The four kinds of action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActionKind {
    /// Produces an artifact (e.g. a container image)
    Build,
    /// Deploys a service
    Deploy,
    /// Runs a one-off task
    Run,
    /// Runs a test suite
    Test,
}

impl ActionKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Build, Self::Deploy, Self::Run, Self::Test];

    /// Lowercase verb used in task keys.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
            Self::Run => "run",
            Self::Test => "test",
        }
    }

    /// Whether actions of this kind execute at runtime (everything but builds).
    #[must_use]
    pub fn is_runtime(self) -> bool {
        !matches!(self, Self::Build)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "build" => Ok(Self::Build),
            "deploy" => Ok(Self::Deploy),
            "run" => Ok(Self::Run),
            "test" => Ok(Self::Test),
            _ => Err(Error::configuration_with_help(
                format!("Unknown action kind '{s}'"),
                "Valid kinds are Build, Deploy, Run and Test",
            )),
        }
    }
}

impl TryFrom<String> for ActionKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.verb().to_string()
    }
}

/// Reference to an action by kind and name, written `<kind>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionRef {
    /// The referenced action's kind
    pub kind: ActionKind,
    /// The referenced action's name
    pub name: String,
}

impl ActionRef {
    /// Create a reference
    #[must_use]
    pub fn new(kind: ActionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ActionRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((kind, name)) = s.split_once('.') else {
            return Err(Error::configuration_with_help(
                format!("Invalid action reference '{s}'"),
                "Action references are written as <kind>.<name>, e.g. build.api",
            ));
        };
        if name.is_empty() {
            return Err(Error::configuration(format!(
                "Action reference '{s}' is missing a name"
            )));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

impl TryFrom<String> for ActionRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ActionRef> for String {
    fn from(reference: ActionRef) -> Self {
        reference.to_string()
    }
}

/// A dependency of one action on another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDependency {
    /// The action depended on
    pub action: ActionRef,
    /// Declared in config rather than inferred from template references
    #[serde(default = "default_true")]
    pub explicit: bool,
    /// The dependant reads outputs known before execution
    #[serde(default)]
    pub needs_static_outputs: bool,
    /// The dependant reads outputs only known after execution
    #[serde(default)]
    pub needs_executed_outputs: bool,
}

fn default_true() -> bool {
    true
}

impl ActionDependency {
    /// An explicit dependency that needs no outputs
    #[must_use]
    pub fn new(action: ActionRef) -> Self {
        Self {
            action,
            explicit: true,
            needs_static_outputs: false,
            needs_executed_outputs: false,
        }
    }

    /// Whether the dependant reads any outputs of the dependency
    #[must_use]
    pub fn needs_outputs(&self) -> bool {
        self.needs_static_outputs || self.needs_executed_outputs
    }
}

/// A configured action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action kind
    pub kind: ActionKind,
    /// Name, unique per kind
    pub name: String,
    /// Action type, selecting the plugin handler (e.g. `container`, `exec`)
    #[serde(rename = "type")]
    pub action_type: String,
    /// Dependencies on other actions
    #[serde(default)]
    pub dependencies: Vec<ActionDependency>,
    /// Disabled actions are never executed
    #[serde(default)]
    pub disabled: bool,
    /// Type-specific spec, opaque to the core
    #[serde(default)]
    pub spec: Value,
}

impl Action {
    /// Create an enabled action with no dependencies and an empty spec
    #[must_use]
    pub fn new(kind: ActionKind, name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            action_type: action_type.into(),
            dependencies: Vec::new(),
            disabled: false,
            spec: Value::Object(serde_json::Map::new()),
        }
    }

    /// Builder: add an explicit dependency
    #[must_use]
    pub fn with_dependency(mut self, dependency: ActionDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Builder: set the spec
    #[must_use]
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }

    /// Builder: mark disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Reference to this action
    #[must_use]
    pub fn reference(&self) -> ActionRef {
        ActionRef::new(self.kind, self.name.clone())
    }

    /// `<kind>.<name>`
    #[must_use]
    pub fn key(&self) -> String {
        self.reference().to_string()
    }

    /// Stable version string derived from the action's configuration.
    ///
    /// Changes whenever kind, name, type, spec or dependency references
    /// change. Formatted as `v-` followed by 10 hex characters.
    #[must_use]
    pub fn version_string(&self) -> String {
        let dependencies: Vec<String> = self
            .dependencies
            .iter()
            .map(|d| d.action.to_string())
            .collect();
        let hash = garden_cache::hash_config(&json!({
            "kind": self.kind.verb(),
            "name": self.name,
            "type": self.action_type,
            "spec": self.spec,
            "dependencies": dependencies,
        }));
        format!("v-{}", &hash[..10])
    }
}

/// All actions of a project, validated for dangling references and cycles
#[derive(Debug, Clone, Default)]
pub struct ConfigGraph {
    actions: BTreeMap<ActionRef, Arc<Action>>,
}

impl ConfigGraph {
    /// Build and validate the graph.
    ///
    /// Fails with a configuration error on duplicate actions, dependencies on
    /// unknown actions and dependency cycles.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Result<Self> {
        let mut by_ref = BTreeMap::new();
        let mut edges = Vec::new();

        for action in actions {
            let reference = action.reference();
            for dependency in &action.dependencies {
                edges.push(DependencyEdge::new(
                    reference.to_string(),
                    dependency.action.to_string(),
                ));
            }
            if by_ref.insert(reference.clone(), Arc::new(action)).is_some() {
                return Err(Error::configuration(format!(
                    "Action '{reference}' is declared more than once"
                )));
            }
        }

        for (reference, action) in &by_ref {
            for dependency in &action.dependencies {
                if !by_ref.contains_key(&dependency.action) {
                    return Err(Error::configuration_with_help(
                        format!(
                            "Action '{reference}' depends on '{}', which does not exist",
                            dependency.action
                        ),
                        "Check the dependency's kind and name",
                    ));
                }
            }
        }

        let cycles = detect_cycles(&edges);
        if !cycles.is_empty() {
            let rendered: Vec<String> = cycles.iter().map(|c| format_cycle(c)).collect();
            return Err(Error::configuration_with_help(
                format!(
                    "Detected circular dependencies between actions:\n  {}",
                    rendered.join("\n  ")
                ),
                "Remove one of the dependencies in each cycle",
            ));
        }

        tracing::debug!(actions = by_ref.len(), "Built action graph");
        Ok(Self { actions: by_ref })
    }

    /// Look up an action; unknown references are a parameter error.
    pub fn get_action(&self, reference: &ActionRef) -> Result<Arc<Action>> {
        self.actions.get(reference).cloned().ok_or_else(|| {
            Error::parameter(format!("Could not find action '{reference}'"))
        })
    }

    /// Whether the action exists
    #[must_use]
    pub fn contains(&self, reference: &ActionRef) -> bool {
        self.actions.contains_key(reference)
    }

    /// All actions, ordered by kind then name
    pub fn actions(&self) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values()
    }

    /// All actions of one kind
    pub fn actions_of_kind(&self, kind: ActionKind) -> impl Iterator<Item = &Arc<Action>> {
        self.actions.values().filter(move |a| a.kind == kind)
    }

    /// Number of actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the graph has no actions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Direct dependencies of an action, resolved to actions
    pub fn dependencies(&self, reference: &ActionRef) -> Result<Vec<(&ActionDependency, Arc<Action>)>> {
        let action = self
            .actions
            .get(reference)
            .ok_or_else(|| Error::parameter(format!("Could not find action '{reference}'")))?;
        action
            .dependencies
            .iter()
            .map(|d| Ok((d, self.get_action(&d.action)?)))
            .collect()
    }

    /// Actions that directly depend on `reference`
    #[must_use]
    pub fn dependants(&self, reference: &ActionRef) -> Vec<Arc<Action>> {
        self.actions
            .values()
            .filter(|a| a.dependencies.iter().any(|d| &d.action == reference))
            .cloned()
            .collect()
    }

    /// The action-level dependency graph, keyed by `<kind>.<name>`
    #[must_use]
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (reference, action) in &self.actions {
            let key = reference.to_string();
            graph.add_node(&key);
            for dependency in &action.dependencies {
                graph.add_dependency(&key, &dependency.action.to_string());
            }
        }
        graph
    }
}
