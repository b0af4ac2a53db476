use fixloop_types::Result;

use crate::conversation::{Reply, Turn};
use crate::engine::Engine;
use crate::prompts::render;
use crate::state::{EngineState, Phase};

impl Engine {
    /// Fix planning: diagnose the build summary with read-only tools and
    /// replace the plan with a corrective one.
    pub(crate) async fn fix_phase(&self, state: &mut EngineState) -> Result<()> {
        let prompts = &self.config.prompts;
        if state.conversation.is_empty() {
            let request = render(
                &prompts.fix_request,
                &[
                    ("build_summary", state.build_summary.as_str()),
                    ("requirement", state.feature_requirement.as_str()),
                ],
            );
            state.push_turn(Turn::system(&prompts.fix_system));
            state.push_turn(Turn::request(request));
        } else {
            state.push_turn(Turn::request(&prompts.fix_continue));
        }

        match self.converse(state, &self.planning_tools).await? {
            Reply::ToolRequest(calls) => {
                self.dispatch_tools(&calls, &self.planning_tools, state).await;
            }
            Reply::Terminal(content) => {
                let plan = self.accept_plan(&content, "fix planning")?;
                // Fresh start: every step of the new plan begins not-started.
                state.replace_plan(plan);
                state.conversation.reset();
                state.phase = Phase::Implementing;
            }
        }
        Ok(())
    }
}
