//! The exclusively-owned state record threaded through every phase of a run.

use std::collections::BTreeMap;
use std::fmt;

use fixloop_types::{FixloopError, Result};
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationBuffer, Turn};
use crate::plan::Plan;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    Success,
    ExhaustedRetries,
    Fatal,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminalStatus::Success => "SUCCESS",
            TerminalStatus::ExhaustedRetries => "EXHAUSTED_RETRIES",
            TerminalStatus::Fatal => "FATAL",
        })
    }
}

/// The single source of truth for which controller is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Implementing,
    Building,
    Fixing,
    Done(TerminalStatus),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Implementing => "implementing",
            Phase::Building => "building",
            Phase::Fixing => "fixing",
            Phase::Done(_) => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done(_))
    }
}

/// Progress of one plan step within an implementation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    NotStarted,
    Started,
    Done,
}

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub run_id: String,
    pub feature_requirement: String,
    pub phase: Phase,
    pub plan: Option<Plan>,
    /// Keyed by 1-based step position. Entries are created as steps start.
    pub step_states: BTreeMap<usize, StepState>,
    /// 1-based pointer into the plan; 0 means no step is active yet.
    pub current_step: usize,
    pub conversation: ConversationBuffer,
    /// Every turn of every phase, in order. Never cleared.
    pub transcript: Vec<Turn>,
    pub build_summary: String,
    pub build_success: bool,
    pub cycles_remaining: u32,
    pub fix_cycles_run: u32,
    pub transitions: usize,
    /// Error text that ended the run as FATAL.
    pub failure: Option<String>,
}

impl EngineState {
    pub fn new(feature_requirement: impl Into<String>, cycles: u32) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            feature_requirement: feature_requirement.into(),
            phase: Phase::Planning,
            plan: None,
            step_states: BTreeMap::new(),
            current_step: 0,
            conversation: ConversationBuffer::new(),
            transcript: Vec::new(),
            build_summary: String::new(),
            build_success: false,
            cycles_remaining: cycles,
            fix_cycles_run: 0,
            transitions: 0,
            failure: None,
        }
    }

    /// Append to the active conversation and the run transcript.
    pub fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn.clone());
        self.conversation.append(turn);
    }

    pub fn terminal_status(&self) -> Option<TerminalStatus> {
        match self.phase {
            Phase::Done(status) => Some(status),
            _ => None,
        }
    }

    pub fn finish(&mut self, status: TerminalStatus) {
        self.phase = Phase::Done(status);
    }

    /// End the run as FATAL, keeping the error text for the caller.
    pub fn fail(&mut self, error: &FixloopError) {
        self.failure = Some(error.to_string());
        self.finish(TerminalStatus::Fatal);
    }

    pub fn step_state(&self, index: usize) -> StepState {
        self.step_states.get(&index).copied().unwrap_or_default()
    }

    pub fn start_step(&mut self, index: usize) -> Result<()> {
        self.move_step(index, StepState::NotStarted, StepState::Started)
    }

    pub fn complete_step(&mut self, index: usize) -> Result<()> {
        self.move_step(index, StepState::Started, StepState::Done)
    }

    fn move_step(&mut self, index: usize, from: StepState, to: StepState) -> Result<()> {
        let current = self.step_state(index);
        if current != from {
            return Err(FixloopError::Other(format!(
                "step {} cannot move from {:?} to {:?}",
                index, current, to
            )));
        }
        self.step_states.insert(index, to);
        Ok(())
    }

    /// Install `plan` wholesale, discarding all step progress.
    pub fn replace_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.step_states.clear();
        self.current_step = 0;
    }
}
