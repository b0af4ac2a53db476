//! Engine event system for observability.
//!
//! Emits [`EngineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! callers can follow a run's progress without reaching into its state.

use serde::{Deserialize, Serialize};

use crate::state::TerminalStatus;

/// Events emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    RunStarted {
        run_id: String,
        requirement: String,
        cycles: u32,
    },
    PhaseEntered {
        phase: String,
    },
    ModelResponded {
        phase: String,
        tool_calls: usize,
    },
    ToolInvoked {
        tool: String,
        is_error: bool,
    },
    PlanAccepted {
        phase: String,
        steps: usize,
    },
    StepStarted {
        step: usize,
        description: String,
    },
    StepCompleted {
        step: usize,
    },
    BuildFinished {
        success: bool,
        summary: String,
    },
    FixCycleStarted {
        cycle: u32,
        cycles_remaining: u32,
    },
    RunFinished {
        status: TerminalStatus,
        transitions: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(EngineEvent::StepStarted {
            step: 2,
            description: "Create entity".into(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::StepStarted { step, description } => {
                assert_eq!(step, 2);
                assert_eq!(description, "Create entity");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let emitter = EventEmitter::new(16);
        emitter.emit(EngineEvent::RunFinished {
            status: TerminalStatus::Fatal,
            transitions: 3,
        });
    }

    #[test]
    fn events_serialize_with_variant_name() {
        let json = serde_json::to_value(EngineEvent::FixCycleStarted {
            cycle: 1,
            cycles_remaining: 2,
        })
        .unwrap();
        assert_eq!(json["FixCycleStarted"]["cycles_remaining"], 2);
    }
}
