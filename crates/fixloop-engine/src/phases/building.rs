use fixloop_types::{FixloopError, Result};

use crate::build::{extract_diagnostics, BuildOutcome};
use crate::engine::Engine;
use crate::events::EngineEvent;
use crate::governor::CycleDecision;
use crate::state::{EngineState, TerminalStatus};

impl Engine {
    /// Invoke the build once and route on its outcome.
    pub(crate) async fn build_phase(&self, state: &mut EngineState) -> Result<()> {
        match self.builder.build(self.env.as_ref()).await {
            BuildOutcome::Succeeded { .. } => {
                state.build_success = true;
                state.build_summary.clear();
                tracing::info!("Build succeeded");
                self.events.emit(EngineEvent::BuildFinished {
                    success: true,
                    summary: String::new(),
                });
                state.finish(TerminalStatus::Success);
            }
            BuildOutcome::Failed { log } => {
                state.build_success = false;
                state.build_summary = extract_diagnostics(&log, &self.config.diagnostics);
                tracing::warn!(
                    diagnostic_lines = state.build_summary.lines().count(),
                    cycles_remaining = state.cycles_remaining,
                    "Build failed"
                );
                self.events.emit(EngineEvent::BuildFinished {
                    success: false,
                    summary: state.build_summary.clone(),
                });
                state.conversation.reset();

                if let CycleDecision::FixCycle { cycle } = self.governor.on_build_failure(state) {
                    self.events.emit(EngineEvent::FixCycleStarted {
                        cycle,
                        cycles_remaining: state.cycles_remaining,
                    });
                }
            }
            BuildOutcome::Unavailable { message } => {
                state.build_success = false;
                return Err(FixloopError::BuildUnavailable(message));
            }
        }
        Ok(())
    }
}
