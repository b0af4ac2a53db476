//! Implementation plans: parsing model output and checking step dependencies.
//!
//! Two JSON shapes are understood. Feature planning answers with
//! `{overview, steps: [{step, description, file, action, changes}]}` and fix
//! planning with `{summary, steps: [{id, description, affectedFiles,
//! dependencies}], estimates}`. Both normalize to [`Plan`].

use std::collections::BTreeSet;
use std::fmt;

use fixloop_types::{FixloopError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Plan / Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimates: Option<Estimates>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: usize,
    pub description: String,
    #[serde(default)]
    pub affected_files: BTreeSet<String>,
    #[serde(default)]
    pub dependency_ids: BTreeSet<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimates {
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default)]
    pub complexity: Option<String>,
}

// Wire shapes accepted from the model.

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default, alias = "overview")]
    summary: String,
    steps: Vec<RawStep>,
    #[serde(default)]
    estimates: Option<Estimates>,
}

#[derive(Deserialize)]
struct RawStep {
    #[serde(default, alias = "step")]
    id: Option<usize>,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "affectedFiles", alias = "affected_files")]
    affected_files: Vec<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default, alias = "dependencyIds", alias = "dependency_ids")]
    dependencies: Vec<usize>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    changes: Option<String>,
}

impl Plan {
    /// Interpret terminal model content as a plan.
    ///
    /// `phase` names the producing phase for error messages.
    pub fn parse(content: &str, phase: &str) -> Result<Plan> {
        let unparsable = |message: String| FixloopError::UnparsablePlan {
            phase: phase.to_string(),
            message,
        };

        let body = strip_code_fence(content);
        if body.is_empty() {
            return Err(unparsable("response was empty".into()));
        }

        let raw: RawPlan = match serde_json::from_str(body) {
            Ok(raw) => raw,
            Err(first) => {
                // Models sometimes wrap the object in prose; try the outermost braces.
                let inner = match (body.find('{'), body.rfind('}')) {
                    (Some(start), Some(end)) if start < end => &body[start..=end],
                    _ => return Err(unparsable(first.to_string())),
                };
                serde_json::from_str(inner).map_err(|e| unparsable(e.to_string()))?
            }
        };

        let steps = raw
            .steps
            .into_iter()
            .enumerate()
            .map(|(index, s)| {
                let mut affected_files: BTreeSet<String> = s.affected_files.into_iter().collect();
                if let Some(file) = s.file {
                    affected_files.insert(file);
                }
                Step {
                    id: s.id.unwrap_or(index + 1),
                    description: s.description,
                    affected_files,
                    dependency_ids: s.dependencies.into_iter().collect(),
                    action: s.action,
                    changes: s.changes,
                }
            })
            .collect();

        Ok(Plan {
            summary: raw.summary,
            steps,
            estimates: raw.estimates,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The step at 1-based position `index`.
    pub fn step(&self, index: usize) -> Option<&Step> {
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    /// Dependencies that do not point at an earlier step.
    pub fn dependency_violations(&self) -> Vec<DependencyViolation> {
        let mut violations = Vec::new();
        for (position, step) in self.steps.iter().enumerate() {
            for &dep in &step.dependency_ids {
                let kind = if dep == step.id {
                    Some(ViolationKind::SelfReference)
                } else if self.steps[..position].iter().any(|s| s.id == dep) {
                    None
                } else if self.steps[position..].iter().any(|s| s.id == dep) {
                    Some(ViolationKind::Forward)
                } else {
                    Some(ViolationKind::Unknown)
                };
                if let Some(kind) = kind {
                    violations.push(DependencyViolation {
                        step: step.id,
                        dependency: dep,
                        kind,
                    });
                }
            }
        }
        violations
    }
}

impl Step {
    /// Pretty, key-sorted JSON used when handing the step to the model.
    pub fn render(&self) -> String {
        serde_json::to_value(self)
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_else(|_| self.description.clone())
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `jsonc`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Dependency checking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    SelfReference,
    Forward,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyViolation {
    pub step: usize,
    pub dependency: usize,
    pub kind: ViolationKind,
}

impl fmt::Display for DependencyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ViolationKind::SelfReference => "itself",
            ViolationKind::Forward => "a later step",
            ViolationKind::Unknown => "an unknown step",
        };
        write!(
            f,
            "step {} depends on {} ({})",
            self.step, what, self.dependency
        )
    }
}

/// How much to trust the dependency ids a planner declares.
///
/// Steps always run in listed order; this only decides what happens when
/// that order contradicts the declared dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCheck {
    Trust,
    #[default]
    Warn,
    Enforce,
}

impl DependencyCheck {
    pub fn apply(&self, plan: &Plan) -> Result<()> {
        if *self == DependencyCheck::Trust {
            return Ok(());
        }
        let violations = plan.dependency_violations();
        if violations.is_empty() {
            return Ok(());
        }
        match self {
            DependencyCheck::Enforce => Err(FixloopError::InvalidPlan(
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            _ => {
                for v in &violations {
                    tracing::warn!(step = v.step, dependency = v.dependency, "{}", v);
                }
                Ok(())
            }
        }
    }
}
