use fixloop_types::{FixloopError, Result};

use crate::conversation::{Reply, Turn};
use crate::engine::Engine;
use crate::events::EngineEvent;
use crate::prompts::render;
use crate::state::{EngineState, Phase, StepState};

impl Engine {
    /// Step implementation: each step in listed order gets a fresh conversation
    /// that runs until the model stops calling tools.
    pub(crate) async fn implement_phase(&self, state: &mut EngineState) -> Result<()> {
        let step_count = state
            .plan
            .as_ref()
            .map(|plan| plan.len())
            .ok_or_else(|| FixloopError::Other("implementation started without a plan".into()))?;

        if state.current_step == 0 {
            state.current_step = 1;
        }
        if state.current_step > step_count {
            self.finish_implementation(state);
            return Ok(());
        }

        let index = state.current_step;
        if state.step_state(index) == StepState::NotStarted {
            self.seed_step(state, index)?;
        }

        match self.converse(state, &self.implementation_tools).await? {
            Reply::ToolRequest(calls) => {
                self.dispatch_tools(&calls, &self.implementation_tools, state)
                    .await;
            }
            Reply::Terminal(_) => {
                state.complete_step(index)?;
                tracing::info!(step = index, of = step_count, "Step completed");
                self.events.emit(EngineEvent::StepCompleted { step: index });
                state.current_step += 1;
                if state.current_step > step_count {
                    self.finish_implementation(state);
                }
            }
        }
        Ok(())
    }

    fn seed_step(&self, state: &mut EngineState, index: usize) -> Result<()> {
        let step = state
            .plan
            .as_ref()
            .and_then(|plan| plan.step(index))
            .ok_or_else(|| FixloopError::Other(format!("plan has no step {}", index)))?;
        let description = step.description.clone();
        let request = render(
            &self.config.prompts.implementation_request,
            &[
                ("step", step.render().as_str()),
                ("requirement", state.feature_requirement.as_str()),
            ],
        );

        state.conversation.reset();
        state.push_turn(Turn::system(&self.config.prompts.implementation_system));
        state.push_turn(Turn::request(request));
        state.start_step(index)?;

        tracing::info!(step = index, description = %description, "Step started");
        self.events.emit(EngineEvent::StepStarted {
            step: index,
            description,
        });
        Ok(())
    }

    fn finish_implementation(&self, state: &mut EngineState) {
        state.conversation.reset();
        state.phase = Phase::Building;
    }
}
