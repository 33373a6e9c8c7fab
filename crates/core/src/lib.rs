//! Core task model and scheduler for Garden.
//!
//! A project declares actions (builds, deploys, runs and tests) and the
//! providers that back them. This crate turns those declarations into a
//! graph of tasks and solves it concurrently:
//!
//! - [`config`]: `garden.toml` loading and validation
//! - [`action`]: actions, references and the validated [`action::ConfigGraph`]
//! - [`plugin`]: handler traits that perform the actual work
//! - [`garden`]: the per-solve context shared by every task
//! - [`tasks`]: resolve, execute and provider tasks, [`tasks::GraphSolver`]
//!   and [`tasks::GraphResults`]
//!
//! # Example
//!
//! ```ignore
//! use garden_core::{Garden, GraphSolver, SolveOptions, plugin::PluginRegistry};
//! use std::sync::Arc;
//!
//! let mut plugins = PluginRegistry::new();
//! plugins.register_action(ActionKind::Build, "container", Arc::new(ContainerBuild));
//!
//! let garden = Arc::new(Garden::load(project_root, Some("dev"), plugins)?);
//! let task = ActionTask::new(Arc::clone(&garden), &"deploy.api".parse()?)?;
//! let results = GraphSolver::new(garden)
//!     .solve(vec![task.into()], SolveOptions::default())
//!     .await?;
//! ```

mod error;

pub mod action;
pub mod config;
pub mod garden;
pub mod plugin;
pub mod tasks;
pub mod tracing;

#[cfg(test)]
mod test_utils;

pub use action::{Action, ActionKind, ActionRef, ConfigGraph};
pub use config::ProjectConfig;
pub use error::{Error, Result};
pub use garden::Garden;
pub use tasks::{GraphResults, GraphSolver, SolveOptions, Task};
