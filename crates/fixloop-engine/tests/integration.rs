//! End-to-end runs against scripted collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fixloop_engine::{
    BackoffPolicy, BuildOutcome, BuildRunner, CommandBuildRunner, DependencyCheck, Engine,
    EngineConfig, EngineEvent, Phase, StepState, TerminalStatus, Turn,
};
use fixloop_llm::{LlmClient, ProviderAdapter, Request, Response, ToolCall};
use fixloop_tools::{ExecResult, ExecutionEnvironment, LocalExecutionEnvironment};
use fixloop_types::FixloopError;

// ---------------------------------------------------------------------------
// Scripted model
// ---------------------------------------------------------------------------

/// Pops one scripted result per call and records every request it sees.
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Response, FixloopError>>>,
    requests: Arc<Mutex<Vec<Request>>>,
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    async fn complete(&self, request: &Request) -> Result<Response, FixloopError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FixloopError::Other("model script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

fn text(content: &str) -> Result<Response, FixloopError> {
    Ok(Response::text(content))
}

fn tool(id: &str, name: &str, arguments: serde_json::Value) -> Result<Response, FixloopError> {
    Ok(Response::tool_calls(vec![ToolCall::new(id, name, arguments)]))
}

fn feature_plan(files: &[&str]) -> Result<Response, FixloopError> {
    let steps: Vec<serde_json::Value> = files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            serde_json::json!({
                "step": i + 1,
                "description": format!("Change {}", file),
                "file": file,
                "action": "update",
                "changes": "as required"
            })
        })
        .collect();
    text(&serde_json::json!({"overview": "feature plan", "steps": steps}).to_string())
}

fn fix_plan(files: &[&str]) -> Result<Response, FixloopError> {
    let steps: Vec<serde_json::Value> = files
        .iter()
        .enumerate()
        .map(|(i, file)| {
            serde_json::json!({
                "id": i + 1,
                "description": format!("Fix {}", file),
                "affectedFiles": [file],
                "dependencies": []
            })
        })
        .collect();
    text(&format!(
        "```json\n{}\n```",
        serde_json::json!({"summary": "fix plan", "steps": steps})
    ))
}

// ---------------------------------------------------------------------------
// In-memory workspace
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MemoryEnv {
    files: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryEnv {
    fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl ExecutionEnvironment for MemoryEnv {
    async fn read_file(&self, path: &Path) -> fixloop_types::Result<String> {
        let key = path.to_string_lossy().to_string();
        self.file(&key)
            .ok_or_else(|| FixloopError::Other(format!("File not found: {}", key)))
    }
    async fn write_file(&self, path: &Path, content: &str) -> fixloop_types::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string_lossy().to_string(), content.to_string());
        Ok(())
    }
    async fn list_files(&self, _path: &Path) -> fixloop_types::Result<Vec<PathBuf>> {
        Ok(self.files.lock().unwrap().keys().map(PathBuf::from).collect())
    }
    async fn exec_command(
        &self,
        _command: &str,
        _timeout_ms: u64,
    ) -> fixloop_types::Result<ExecResult> {
        Err(FixloopError::Other("no shell in memory".into()))
    }
    fn working_directory(&self) -> &Path {
        Path::new("/project")
    }
}

// ---------------------------------------------------------------------------
// Scripted build
// ---------------------------------------------------------------------------

const MAVEN_FAILURE: &str = "[INFO] Compiling\n\
[ERROR] /src/Booking.java:[3,8] cannot find symbol\n\
[ERROR] /src/Booking.java:[7,1] missing return\n\
[INFO] BUILD FAILURE\n";

/// Returns scripted outcomes in order, then repeats `fallback`.
struct ScriptedBuilder {
    outcomes: Mutex<VecDeque<BuildOutcome>>,
    fallback: BuildOutcome,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBuilder {
    fn new(outcomes: Vec<BuildOutcome>, fallback: BuildOutcome) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                outcomes: Mutex::new(outcomes.into()),
                fallback,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn always(outcome: BuildOutcome) -> (Self, Arc<AtomicUsize>) {
        Self::new(vec![], outcome)
    }
}

#[async_trait]
impl BuildRunner for ScriptedBuilder {
    async fn build(&self, _env: &dyn ExecutionEnvironment) -> BuildOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

fn succeeded() -> BuildOutcome {
    BuildOutcome::Succeeded {
        log: "BUILD SUCCESS".into(),
    }
}

fn failed() -> BuildOutcome {
    BuildOutcome::Failed {
        log: MAVEN_FAILURE.into(),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn test_config() -> EngineConfig {
    EngineConfig {
        max_model_retries: 0,
        backoff: BackoffPolicy::None,
        ..EngineConfig::default()
    }
}

fn make_engine(
    script: Vec<Result<Response, FixloopError>>,
    env: MemoryEnv,
    builder: ScriptedBuilder,
    config: EngineConfig,
) -> (Engine, Arc<Mutex<Vec<Request>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let mut client = LlmClient::new();
    client.register_provider(ScriptedProvider {
        script: Mutex::new(script.into()),
        requests: requests.clone(),
    });
    (Engine::new(client, env, builder, config), requests)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn entered(events: &[EngineEvent], phase: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, EngineEvent::PhaseEntered { phase: p } if p == phase))
}

fn tool_names(request: &Request) -> Vec<String> {
    request.tools.iter().map(|t| t.name.clone()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feature_run_implements_every_step_and_succeeds() {
    let env = MemoryEnv::default().with_file("pom.xml", "<project/>");
    let (builder, builds) = ScriptedBuilder::always(succeeded());
    let (engine, _) = make_engine(
        vec![
            tool("c1", "list_project_files", serde_json::json!({})),
            feature_plan(&["src/Booking.java", "pom.xml"]),
            tool(
                "c2",
                "write_file",
                serde_json::json!({"file_path": "src/Booking.java", "content": "class Booking {}"}),
            ),
            text("Created Booking"),
            text("Nothing to change in pom.xml"),
        ],
        env.clone(),
        builder,
        test_config(),
    );
    let mut rx = engine.events().subscribe();

    let state = engine.run("Add bookings", 2).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));
    assert!(state.failure.is_none());
    assert!(state.build_success);
    assert!(state.build_summary.is_empty());
    assert_eq!(state.cycles_remaining, 2);
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(env.file("src/Booking.java").as_deref(), Some("class Booking {}"));

    assert_eq!(state.step_state(1), StepState::Done);
    assert_eq!(state.step_state(2), StepState::Done);
    assert_eq!(state.current_step, 3);

    // planning: system, request, tool call, result, continuation, plan
    // step 1: system, request, tool call, result, summary
    // step 2: system, request, summary
    assert_eq!(state.transcript.len(), 14);
    assert!(matches!(&state.transcript[0], Turn::System { .. }));
    assert!(state.transcript[1].content().contains("Add bookings"));
    assert_eq!(state.transcript[4], Turn::request("Continue planning."));
    assert!(state.transcript[7].content().contains("src/Booking.java"));
    assert!(state.conversation.is_empty());

    let events = drain(&mut rx);
    let finished: Vec<&EngineEvent> = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::RunFinished { .. }))
        .collect();
    assert_eq!(finished.len(), 1);
    assert!(!entered(&events, "fixing"));
}

#[tokio::test]
async fn implementation_has_exactly_one_more_tool_than_planning() {
    let (builder, _) = ScriptedBuilder::always(succeeded());
    let (engine, requests) = make_engine(
        vec![feature_plan(&["a.txt"]), text("done")],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 0).await;
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(tool_names(&requests[0]), vec!["list_project_files", "read_file"]);
    assert_eq!(
        tool_names(&requests[1]),
        vec!["list_project_files", "read_file", "write_file"]
    );
    assert_eq!(requests[0].model, "gpt-4o");
}

#[tokio::test]
async fn zero_cycles_with_failing_build_exhausts_without_fixing() {
    let (builder, builds) = ScriptedBuilder::always(failed());
    let (engine, requests) = make_engine(
        vec![feature_plan(&["a.txt"]), text("done")],
        MemoryEnv::default(),
        builder,
        test_config(),
    );
    let mut rx = engine.events().subscribe();

    let state = engine.run("r", 0).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::ExhaustedRetries));
    assert_eq!(state.fix_cycles_run, 0);
    assert_eq!(state.cycles_remaining, 0);
    assert!(!state.build_success);
    assert!(state.build_summary.starts_with("=== ERRORS ==="));
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(requests.lock().unwrap().len(), 2);
    assert!(!entered(&drain(&mut rx), "fixing"));
}

#[tokio::test]
async fn at_most_n_fix_cycles_run() {
    let (builder, builds) = ScriptedBuilder::always(failed());
    let (engine, requests) = make_engine(
        vec![
            feature_plan(&["a.txt"]),
            text("done"),
            fix_plan(&["a.txt"]),
            text("fixed"),
            fix_plan(&["a.txt"]),
            text("fixed again"),
        ],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 2).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::ExhaustedRetries));
    assert_eq!(state.fix_cycles_run, 2);
    assert_eq!(state.cycles_remaining, 0);
    assert_eq!(builds.load(Ordering::SeqCst), 3);
    assert_eq!(requests.lock().unwrap().len(), 6);
    assert!(state.build_summary.contains("missing return"));
}

#[tokio::test]
async fn fix_cycle_restarts_every_step() {
    let (builder, _) = ScriptedBuilder::new(vec![failed()], succeeded());
    let (engine, requests) = make_engine(
        vec![
            feature_plan(&["a.txt"]),
            text("done"),
            tool("c1", "read_file", serde_json::json!({"file_path": "a.txt"})),
            fix_plan(&["a.txt", "b.txt"]),
            text("fixed a"),
            text("fixed b"),
        ],
        MemoryEnv::default().with_file("a.txt", "a"),
        builder,
        test_config(),
    );
    let mut state = engine.start("r", 1);

    assert_eq!(engine.advance(&mut state).await, Phase::Implementing);
    assert_eq!(engine.advance(&mut state).await, Phase::Building);
    assert_eq!(state.step_state(1), StepState::Done);

    assert_eq!(engine.advance(&mut state).await, Phase::Fixing);
    assert_eq!(state.cycles_remaining, 0);
    assert!(state.conversation.is_empty());

    // A tool round inside fix planning stays in Fixing.
    assert_eq!(engine.advance(&mut state).await, Phase::Fixing);
    assert!(state.conversation.turns()[1].content().contains("[ERROR] /src/Booking.java"));

    assert_eq!(engine.advance(&mut state).await, Phase::Implementing);
    assert_eq!(state.step_state(1), StepState::NotStarted);
    assert_eq!(state.current_step, 0);
    assert_eq!(state.plan.as_ref().unwrap().summary, "fix plan");

    while !state.phase.is_terminal() {
        engine.advance(&mut state).await;
    }
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));
    assert_eq!(state.step_state(2), StepState::Done);

    // The continuation prompt, not a second seed, follows the fix tool round.
    let requests = requests.lock().unwrap();
    let fix_request = &requests[3];
    let last = fix_request.messages.last().unwrap();
    assert_eq!(last.text(), "Continue planning the fix.");
}

#[tokio::test]
async fn tool_round_trip_appends_two_turns_before_advancing() {
    let (builder, _) = ScriptedBuilder::always(succeeded());
    let (engine, _) = make_engine(
        vec![
            feature_plan(&["pom.xml"]),
            tool("c1", "read_file", serde_json::json!({"file_path": "pom.xml"})),
            text("pom.xml already correct"),
        ],
        MemoryEnv::default().with_file("pom.xml", "<project/>"),
        builder,
        test_config(),
    );
    let mut state = engine.start("r", 0);
    assert_eq!(engine.advance(&mut state).await, Phase::Implementing);

    let before = state.transcript.len();
    assert_eq!(engine.advance(&mut state).await, Phase::Implementing);
    // Two seed turns, then the tool-call response and its result.
    assert_eq!(state.transcript.len() - before, 4);
    assert_eq!(state.current_step, 1);
    assert_eq!(state.step_state(1), StepState::Started);
    let turns = state.conversation.turns();
    assert!(matches!(&turns[2], Turn::Response { tool_calls, .. } if tool_calls.len() == 1));
    assert!(
        matches!(&turns[3], Turn::ToolResult { content, is_error: false, .. } if content == "<project/>")
    );

    let before = state.transcript.len();
    assert_eq!(engine.advance(&mut state).await, Phase::Building);
    assert_eq!(state.transcript.len() - before, 1);
    assert_eq!(state.current_step, 2);
    assert_eq!(state.step_state(1), StepState::Done);
}

#[tokio::test]
async fn tool_failures_are_fed_back_to_the_model() {
    let (builder, _) = ScriptedBuilder::always(succeeded());
    let (engine, requests) = make_engine(
        vec![
            tool("c1", "read_file", serde_json::json!({"file_path": "Missing.java"})),
            tool("c2", "write_file", serde_json::json!({"file_path": "x", "content": "y"})),
            feature_plan(&[]),
        ],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 0).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));
    let errors: Vec<&Turn> = state
        .transcript
        .iter()
        .filter(|t| matches!(t, Turn::ToolResult { is_error: true, .. }))
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].content().contains("Missing.java"));
    // Planning cannot write.
    assert!(errors[1].content().contains("Unknown tool: write_file"));
    assert_eq!(requests.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn unparsable_plan_is_fatal() {
    let (builder, builds) = ScriptedBuilder::always(succeeded());
    let (engine, _) = make_engine(
        vec![text("I'd rather not plan today.")],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 3).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert!(state.failure.as_deref().unwrap().contains("planning"));
    assert!(state.plan.is_none());
    assert_eq!(builds.load(Ordering::SeqCst), 0);
    // The unusable answer is still in the transcript.
    assert_eq!(
        state.transcript.last().unwrap().content(),
        "I'd rather not plan today."
    );
}

#[tokio::test]
async fn unparsable_fix_plan_is_fatal() {
    let (builder, _) = ScriptedBuilder::always(failed());
    let (engine, _) = make_engine(
        vec![feature_plan(&["a.txt"]), text("done"), text("no idea")],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 1).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert!(state.failure.as_deref().unwrap().contains("fix planning"));
    assert_eq!(state.fix_cycles_run, 1);
}

#[tokio::test]
async fn enforced_dependency_check_rejects_forward_references() {
    let plan = r#"{"summary": "s", "steps": [
        {"id": 1, "description": "a", "dependencies": [2]},
        {"id": 2, "description": "b"}
    ]}"#;
    let (builder, _) = ScriptedBuilder::always(succeeded());

    let (warn_engine, _) = make_engine(
        vec![text(plan), text("a"), text("b")],
        MemoryEnv::default(),
        ScriptedBuilder::always(succeeded()).0,
        test_config(),
    );
    let state = warn_engine.run("r", 0).await;
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));

    let (engine, _) = make_engine(
        vec![text(plan)],
        MemoryEnv::default(),
        builder,
        EngineConfig {
            dependency_check: DependencyCheck::Enforce,
            ..test_config()
        },
    );
    let state = engine.run("r", 0).await;
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert!(state.failure.as_deref().unwrap().contains("Plan rejected"));
}

#[tokio::test]
async fn unavailable_build_is_fatal_without_spending_a_cycle() {
    let (builder, _) = ScriptedBuilder::always(BuildOutcome::Unavailable {
        message: "mvn: command not found".into(),
    });
    let (engine, _) = make_engine(
        vec![feature_plan(&["a.txt"]), text("done")],
        MemoryEnv::default(),
        builder,
        test_config(),
    );

    let state = engine.run("r", 3).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert_eq!(state.cycles_remaining, 3);
    assert_eq!(state.fix_cycles_run, 0);
    assert!(state.failure.as_deref().unwrap().contains("mvn: command not found"));
}

#[tokio::test]
async fn transition_ceiling_stops_endless_tool_rounds() {
    let script = (0..10)
        .map(|i| tool(&format!("c{}", i), "list_project_files", serde_json::json!({})))
        .collect();
    let (builder, _) = ScriptedBuilder::always(succeeded());
    let (engine, requests) = make_engine(
        script,
        MemoryEnv::default(),
        builder,
        EngineConfig {
            max_transitions: 4,
            ..test_config()
        },
    );

    let state = engine.run("r", 0).await;

    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert_eq!(state.transitions, 4);
    assert!(state.failure.as_deref().unwrap().contains("Transition limit"));
    assert_eq!(requests.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn model_errors_are_retried_then_fatal() {
    let (builder, _) = ScriptedBuilder::always(succeeded());
    let (engine, requests) = make_engine(
        vec![
            Err(FixloopError::RateLimited {
                provider: "scripted".into(),
                retry_after_ms: 0,
            }),
            feature_plan(&[]),
        ],
        MemoryEnv::default(),
        builder,
        EngineConfig {
            max_model_retries: 2,
            ..test_config()
        },
    );
    let state = engine.run("r", 0).await;
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Success));
    assert_eq!(requests.lock().unwrap().len(), 2);

    let (engine, requests) = make_engine(
        vec![Err(FixloopError::AuthError {
            provider: "scripted".into(),
        })],
        MemoryEnv::default(),
        ScriptedBuilder::always(succeeded()).0,
        EngineConfig {
            max_model_retries: 2,
            ..test_config()
        },
    );
    let state = engine.run("r", 0).await;
    assert_eq!(state.terminal_status(), Some(TerminalStatus::Fatal));
    assert!(state.failure.as_deref().unwrap().contains("Authentication failed"));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn command_build_runner_classifies_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let env = LocalExecutionEnvironment::new(dir.path());

    let outcome = CommandBuildRunner::new("echo compiled").build(&env).await;
    assert!(matches!(outcome, BuildOutcome::Succeeded { ref log } if log.contains("compiled")));

    let outcome = CommandBuildRunner::new("echo '[ERROR] boom'; echo 'BUILD FAILURE'; exit 1")
        .build(&env)
        .await;
    assert!(matches!(outcome, BuildOutcome::Failed { ref log } if log.contains("[ERROR] boom")));

    let outcome = CommandBuildRunner::new("surely-not-a-build-tool-xyz")
        .build(&env)
        .await;
    assert!(matches!(outcome, BuildOutcome::Unavailable { .. }));

    let outcome = CommandBuildRunner::new("sleep 5")
        .with_timeout_ms(100)
        .build(&env)
        .await;
    assert!(matches!(outcome, BuildOutcome::Unavailable { ref message } if message.contains("timed out")));
}
