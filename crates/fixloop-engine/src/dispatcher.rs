use fixloop_llm::ToolCall;
use fixloop_tools::truncation::{truncate_output, TruncationMode};
use fixloop_tools::{ExecutionEnvironment, ToolRegistry};

use crate::conversation::Turn;
use crate::events::{EngineEvent, EventEmitter};
use crate::state::EngineState;

/// Longest tool output handed back to the model.
pub const MAX_TOOL_OUTPUT_LEN: usize = 30_000;

/// Executes requested tool calls against one phase's registry.
///
/// Failures never propagate: an unknown tool or a failing executor becomes a
/// result turn with `is_error` set, for the model to read on its next turn.
pub struct ToolDispatcher<'a> {
    registry: &'a ToolRegistry,
    env: &'a dyn ExecutionEnvironment,
    events: &'a EventEmitter,
    max_output: usize,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(
        registry: &'a ToolRegistry,
        env: &'a dyn ExecutionEnvironment,
        events: &'a EventEmitter,
    ) -> Self {
        Self {
            registry,
            env,
            events,
            max_output: MAX_TOOL_OUTPUT_LEN,
        }
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    /// Run `calls` one at a time, in order, appending one result turn per call.
    pub async fn execute(&self, calls: &[ToolCall], state: &mut EngineState) {
        for call in calls {
            tracing::debug!(tool = %call.name, id = %call.id, "Executing tool call");

            let (content, is_error) = match self.registry.get(&call.name) {
                Some(tool) => match tool.execute(call.arguments.clone(), self.env).await {
                    Ok(output) => (
                        truncate_output(&output, self.max_output, TruncationMode::HeadTail),
                        false,
                    ),
                    Err(e) => {
                        tracing::debug!(tool = %call.name, error = %e, "Tool execution failed");
                        (format!("Error: {}", e), true)
                    }
                },
                None => {
                    tracing::debug!(tool = %call.name, "Unknown tool requested");
                    (format!("Error: Unknown tool: {}", call.name), true)
                }
            };

            self.events.emit(EngineEvent::ToolInvoked {
                tool: call.name.clone(),
                is_error,
            });
            state.push_turn(Turn::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content,
                is_error,
            });
        }
    }
}
