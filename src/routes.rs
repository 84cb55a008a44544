//! Fixed endpoint table for the router API
//!
//! Paths are constant; only the base address is configurable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::client::RequestSpec;

pub const ROUTE_PATH: &str = "/v1/route";

/// Task category forced on the router; `Auto` lets it decide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Auto,
    Math,
    Writing,
    Search,
}

impl Task {
    pub fn all() -> &'static [Task] {
        &[Task::Auto, Task::Math, Task::Writing, Task::Search]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::Auto => "auto",
            Task::Math => "math",
            Task::Writing => "writing",
            Task::Search => "search",
        }
    }

    /// Next task in chip order, wrapping around
    pub fn next(&self) -> Task {
        let tasks = Task::all();
        let idx = tasks.iter().position(|t| t == self).unwrap_or(0);
        tasks[(idx + 1) % tasks.len()]
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::all()
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task '{}' (expected auto, math, writing or search)", s))
    }
}

/// Body of POST /v1/route
#[derive(Debug, Clone, Serialize)]
pub struct RouteBody {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

impl RouteBody {
    pub fn new(prompt: &str, task: Task) -> Self {
        Self {
            prompt: prompt.to_string(),
            task: (task != Task::Auto).then_some(task),
        }
    }
}

/// Build the request for a send intent
pub fn route_request(prompt: &str, task: Task) -> RequestSpec {
    let body = serde_json::to_value(RouteBody::new(prompt, task))
        .unwrap_or_else(|_| serde_json::json!({ "prompt": prompt }));
    RequestSpec::post(ROUTE_PATH, body)
}

/// Read-only diagnostic endpoints; these never create history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    Health,
    Version,
    Metrics,
    ImprovementLog,
}

impl Diagnostic {
    pub fn all() -> &'static [Diagnostic] {
        &[
            Diagnostic::Health,
            Diagnostic::Version,
            Diagnostic::Metrics,
            Diagnostic::ImprovementLog,
        ]
    }

    pub fn path(&self) -> &'static str {
        match self {
            Diagnostic::Health => "/health",
            Diagnostic::Version => "/version",
            Diagnostic::Metrics => "/metrics",
            Diagnostic::ImprovementLog => "/improvement-log",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Diagnostic::Health => "health",
            Diagnostic::Version => "version",
            Diagnostic::Metrics => "metrics",
            Diagnostic::ImprovementLog => "improvement-log",
        }
    }

    pub fn from_name(name: &str) -> Option<Diagnostic> {
        Diagnostic::all().iter().copied().find(|d| d.name() == name)
    }

    pub fn request(&self) -> RequestSpec {
        RequestSpec::get(self.path())
    }
}
