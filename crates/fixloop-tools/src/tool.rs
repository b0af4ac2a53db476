use std::collections::BTreeMap;

use async_trait::async_trait;

pub use fixloop_llm::ToolDefinition;

use crate::environment::ExecutionEnvironment;

/// A project tool the model can call during planning or implementation.
///
/// An `Err` from [`Tool::execute`] is not fatal to a run: the dispatcher turns
/// it into an error result the model reads on its next turn.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(
        &self,
        arguments: serde_json::Value,
        env: &dyn ExecutionEnvironment,
    ) -> fixloop_types::Result<String>;
}

/// The tools offered to the model in one phase, keyed by name.
///
/// Ordered by name: the definitions go into every model request of a phase,
/// and a fixed order keeps consecutive requests identical apart from the
/// conversation. Registering a name twice keeps the later tool.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let def = tool.definition();
        self.tools.insert(def.name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether a phase using this registry may call `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Definitions in name order, as sent with each model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
