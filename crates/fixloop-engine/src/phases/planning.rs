use fixloop_types::Result;

use crate::conversation::{Reply, Turn};
use crate::engine::Engine;
use crate::events::EngineEvent;
use crate::plan::Plan;
use crate::prompts::render;
use crate::state::{EngineState, Phase};

impl Engine {
    /// Feature planning: read-only tool rounds until the model answers with a plan.
    pub(crate) async fn plan_phase(&self, state: &mut EngineState) -> Result<()> {
        let prompts = &self.config.prompts;
        if state.conversation.is_empty() {
            let request = render(
                &prompts.planning_request,
                &[("requirement", state.feature_requirement.as_str())],
            );
            state.push_turn(Turn::system(&prompts.planning_system));
            state.push_turn(Turn::request(request));
        } else {
            state.push_turn(Turn::request(&prompts.planning_continue));
        }

        match self.converse(state, &self.planning_tools).await? {
            Reply::ToolRequest(calls) => {
                self.dispatch_tools(&calls, &self.planning_tools, state).await;
            }
            Reply::Terminal(content) => {
                let plan = self.accept_plan(&content, "planning")?;
                state.replace_plan(plan);
                state.conversation.reset();
                state.phase = Phase::Implementing;
            }
        }
        Ok(())
    }

    /// Parse and validate a plan produced by planning or fix planning.
    pub(crate) fn accept_plan(&self, content: &str, phase: &str) -> Result<Plan> {
        let plan = Plan::parse(content, phase)?;
        self.config.dependency_check.apply(&plan)?;
        tracing::info!(phase, steps = plan.len(), summary = %plan.summary, "Plan accepted");
        self.events.emit(EngineEvent::PlanAccepted {
            phase: phase.to_string(),
            steps: plan.len(),
        });
        Ok(plan)
    }
}
