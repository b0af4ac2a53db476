//! The transition loop: one phase step per transition until a terminal status.

use fixloop_llm::{LlmClient, ToolCall};
use fixloop_tools::{ExecutionEnvironment, ToolProfile, ToolRegistry};
use fixloop_types::Result;

use crate::build::{BuildRunner, DiagnosticMarkers};
use crate::conversation::{Reply, Turn};
use crate::dispatcher::{ToolDispatcher, MAX_TOOL_OUTPUT_LEN};
use crate::events::{EngineEvent, EventEmitter};
use crate::governor::CycleGovernor;
use crate::model::ModelCaller;
use crate::plan::DependencyCheck;
use crate::prompts::PromptSet;
use crate::retry::BackoffPolicy;
use crate::state::{EngineState, Phase};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: String,
    /// Safety ceiling on transitions for a whole run, independent of fix cycles.
    pub max_transitions: usize,
    /// Retries for transient model-call failures.
    pub max_model_retries: usize,
    pub backoff: BackoffPolicy,
    pub dependency_check: DependencyCheck,
    pub diagnostics: DiagnosticMarkers,
    pub max_tool_output: usize,
    pub prompts: PromptSet,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_transitions: 100,
            max_model_retries: 3,
            backoff: BackoffPolicy::default(),
            dependency_check: DependencyCheck::default(),
            diagnostics: DiagnosticMarkers::default(),
            max_tool_output: MAX_TOOL_OUTPUT_LEN,
            prompts: PromptSet::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Drives a run through planning, implementation, build and fix phases.
///
/// The engine holds only collaborators and configuration; all run state lives
/// in the [`EngineState`] passed to [`Engine::advance`].
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) model: ModelCaller,
    pub(crate) env: Box<dyn ExecutionEnvironment>,
    pub(crate) builder: Box<dyn BuildRunner>,
    pub(crate) planning_tools: ToolRegistry,
    pub(crate) implementation_tools: ToolRegistry,
    pub(crate) governor: CycleGovernor,
    pub(crate) events: EventEmitter,
}

impl Engine {
    pub fn new(
        client: LlmClient,
        env: impl ExecutionEnvironment + 'static,
        builder: impl BuildRunner + 'static,
        config: EngineConfig,
    ) -> Self {
        let model = ModelCaller::new(client, config.model.clone())
            .with_retries(config.max_model_retries, config.backoff.clone());
        Self {
            model,
            env: Box::new(env),
            builder: Box::new(builder),
            planning_tools: ToolProfile::planning().build_registry(),
            implementation_tools: ToolProfile::implementation().build_registry(),
            governor: CycleGovernor::new(config.max_transitions),
            events: EventEmitter::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Create the state for a new run without executing anything.
    pub fn start(&self, requirement: impl Into<String>, cycles: u32) -> EngineState {
        let state = EngineState::new(requirement, cycles);
        tracing::info!(
            run_id = %state.run_id,
            cycles,
            model = %self.model.model(),
            "Starting run"
        );
        self.events.emit(EngineEvent::RunStarted {
            run_id: state.run_id.clone(),
            requirement: state.feature_requirement.clone(),
            cycles,
        });
        self.events.emit(EngineEvent::PhaseEntered {
            phase: state.phase.name().to_string(),
        });
        state
    }

    /// Run from a requirement to a terminal status.
    pub async fn run(&self, requirement: impl Into<String>, cycles: u32) -> EngineState {
        let mut state = self.start(requirement, cycles);
        while !state.phase.is_terminal() {
            self.advance(&mut state).await;
        }
        if let Some(status) = state.terminal_status() {
            tracing::info!(
                run_id = %state.run_id,
                %status,
                transitions = state.transitions,
                fix_cycles = state.fix_cycles_run,
                "Run finished"
            );
            self.events.emit(EngineEvent::RunFinished {
                status,
                transitions: state.transitions,
            });
        }
        state
    }

    /// Perform one transition of the active phase and return the phase after it.
    ///
    /// Any error escaping a phase ends the run as FATAL.
    pub async fn advance(&self, state: &mut EngineState) -> Phase {
        let before = state.phase;
        if before.is_terminal() {
            return before;
        }

        let result = match self.governor.admit_transition(state) {
            Ok(()) => self.run_phase(state).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(phase = before.name(), error = %e, "Run failed");
            state.fail(&e);
        }

        if state.phase != before {
            tracing::debug!(from = before.name(), to = state.phase.name(), "Phase transition");
            self.events.emit(EngineEvent::PhaseEntered {
                phase: state.phase.name().to_string(),
            });
        }
        state.phase
    }

    async fn run_phase(&self, state: &mut EngineState) -> Result<()> {
        match state.phase {
            Phase::Planning => self.plan_phase(state).await,
            Phase::Implementing => self.implement_phase(state).await,
            Phase::Building => self.build_phase(state).await,
            Phase::Fixing => self.fix_phase(state).await,
            Phase::Done(_) => Ok(()),
        }
    }

    /// Ask the model for the next response and record it.
    pub(crate) async fn converse(
        &self,
        state: &mut EngineState,
        tools: &ToolRegistry,
    ) -> Result<Reply> {
        let phase = state.phase.name();
        let response = self.model.invoke(&state.conversation, tools, phase).await?;
        let reply = Reply::from_parts(&response.text, &response.tool_calls);

        tracing::info!(
            phase,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            tool_calls = response.tool_calls.len(),
            "Model responded"
        );
        self.events.emit(EngineEvent::ModelResponded {
            phase: phase.to_string(),
            tool_calls: response.tool_calls.len(),
        });

        state.push_turn(Turn::response(response.text, response.tool_calls));
        Ok(reply)
    }

    pub(crate) async fn dispatch_tools(
        &self,
        calls: &[ToolCall],
        tools: &ToolRegistry,
        state: &mut EngineState,
    ) {
        ToolDispatcher::new(tools, self.env.as_ref(), &self.events)
            .with_max_output(self.config.max_tool_output)
            .execute(calls, state)
            .await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
