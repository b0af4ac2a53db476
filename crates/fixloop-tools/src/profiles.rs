//! Phase-specific tool profiles.
//!
//! Planning phases only look at the project; implementation may also write.
//! The implementation profile is the planning profile plus `write_file`.

use crate::builtin::{ListProjectFilesTool, ReadFileTool, WriteFileTool};
use crate::tool::ToolRegistry;

/// A profile that selects which tools to register for a phase.
#[derive(Debug, Clone)]
pub struct ToolProfile {
    pub name: String,
    pub tools: Vec<String>,
}

impl ToolProfile {
    /// Read-only tools for feature planning and fix planning.
    pub fn planning() -> Self {
        Self {
            name: "planning".into(),
            tools: vec!["read_file".into(), "list_project_files".into()],
        }
    }

    /// Tools for implementing a plan step.
    pub fn implementation() -> Self {
        let mut profile = Self::planning();
        profile.name = "implementation".into();
        profile.tools.push("write_file".into());
        profile
    }

    /// Build a [`ToolRegistry`] from this profile using the built-in tools.
    pub fn build_registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in &self.tools {
            match name.as_str() {
                "read_file" => registry.register(ReadFileTool),
                "list_project_files" => registry.register(ListProjectFilesTool),
                "write_file" => registry.register(WriteFileTool),
                other => tracing::warn!(tool = %other, profile = %self.name, "Unknown tool in profile"),
            }
        }
        registry
    }
}
