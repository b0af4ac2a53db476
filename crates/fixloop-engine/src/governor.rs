//! Bounds on total work: the fix-cycle budget and the transition ceiling.

use fixloop_types::{FixloopError, Result};

use crate::state::{EngineState, Phase, TerminalStatus};

/// What happens after a failed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDecision {
    /// Enter fix cycle number `cycle` (1-based).
    FixCycle { cycle: u32 },
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct CycleGovernor {
    max_transitions: usize,
}

impl CycleGovernor {
    pub fn new(max_transitions: usize) -> Self {
        Self { max_transitions }
    }

    /// Count one transition, refusing once the ceiling is reached.
    pub fn admit_transition(&self, state: &mut EngineState) -> Result<()> {
        if state.transitions >= self.max_transitions {
            return Err(FixloopError::TransitionLimit {
                limit: self.max_transitions,
            });
        }
        state.transitions += 1;
        Ok(())
    }

    /// Spend one cycle on a fix attempt, or end the run when none are left.
    pub fn on_build_failure(&self, state: &mut EngineState) -> CycleDecision {
        if state.cycles_remaining == 0 {
            tracing::info!(fix_cycles_run = state.fix_cycles_run, "Fix cycles exhausted");
            state.finish(TerminalStatus::ExhaustedRetries);
            return CycleDecision::Exhausted;
        }
        state.cycles_remaining -= 1;
        state.fix_cycles_run += 1;
        state.phase = Phase::Fixing;
        tracing::info!(
            cycle = state.fix_cycles_run,
            cycles_remaining = state.cycles_remaining,
            "Starting fix cycle"
        );
        CycleDecision::FixCycle {
            cycle: state.fix_cycles_run,
        }
    }
}

impl Default for CycleGovernor {
    fn default() -> Self {
        Self::new(100)
    }
}
