//! CLI binary for running fixloop against a project.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use fixloop_engine::{
    extract_diagnostics, load_report, save_report, CommandBuildRunner, DependencyCheck,
    DiagnosticMarkers, Engine, EngineConfig, RunReport, TerminalStatus, Turn,
};
use fixloop_llm::{LlmClient, LoggingMiddleware, UsageTracker};
use fixloop_tools::LocalExecutionEnvironment;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fixloop", version, about = "Plan, implement, build and fix code changes with a language model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Implement a requirement in a project, fixing build failures as they come up
    Run {
        /// The feature or fix to implement
        #[arg(short, long, required_unless_present = "requirement_file")]
        requirement: Option<String>,

        /// Read the requirement from a file instead
        #[arg(long, conflicts_with = "requirement")]
        requirement_file: Option<PathBuf>,

        /// Project root the tools and the build operate in (default: current directory)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Maximum number of build-fix cycles after the first build
        #[arg(short, long, default_value_t = 3)]
        cycles: u32,

        /// Shell command that builds the project
        #[arg(long, default_value = "mvn clean install")]
        build_command: String,

        /// Seconds before the build command is considered hung
        #[arg(long, default_value_t = 600)]
        build_timeout_secs: u64,

        /// Which build tool's output markers to extract diagnostics with
        #[arg(long, value_enum, default_value_t = Diagnostics::Maven)]
        diagnostics: Diagnostics,

        /// Model identifier sent to the provider
        #[arg(long, default_value = "gpt-4o")]
        model: String,

        /// Maximum number of engine transitions before aborting. Prevents runaway loops.
        #[arg(long, default_value_t = 100)]
        max_transitions: usize,

        /// What to do when a plan's step dependencies contradict its step order
        #[arg(long, value_enum, default_value_t = DependencyMode::Warn)]
        dependency_check: DependencyMode,

        /// Directory for the run report (default: .fixloop/logs/<timestamp>)
        #[arg(short, long)]
        logs: Option<PathBuf>,
    },

    /// Print the diagnostics fixloop would extract from a saved build log
    Diagnose {
        /// Path to the build log
        log: PathBuf,

        #[arg(long, value_enum, default_value_t = Diagnostics::Maven)]
        diagnostics: Diagnostics,
    },

    /// Summarize the run report saved in a logs directory
    Report {
        /// Logs directory a previous run wrote its report to
        logs: PathBuf,

        /// Also print the full transcript
        #[arg(short, long)]
        transcript: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Diagnostics {
    Maven,
    Cargo,
}

impl Diagnostics {
    fn markers(self) -> DiagnosticMarkers {
        match self {
            Diagnostics::Maven => DiagnosticMarkers::maven(),
            Diagnostics::Cargo => DiagnosticMarkers::cargo(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DependencyMode {
    Trust,
    Warn,
    Enforce,
}

impl From<DependencyMode> for DependencyCheck {
    fn from(mode: DependencyMode) -> Self {
        match mode {
            DependencyMode::Trust => DependencyCheck::Trust,
            DependencyMode::Warn => DependencyCheck::Warn,
            DependencyMode::Enforce => DependencyCheck::Enforce,
        }
    }
}

struct RunOptions {
    requirement: String,
    workdir: PathBuf,
    cycles: u32,
    build: CommandBuildRunner,
    logs: PathBuf,
    config: EngineConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Run {
            requirement,
            requirement_file,
            workdir,
            cycles,
            build_command,
            build_timeout_secs,
            diagnostics,
            model,
            max_transitions,
            dependency_check,
            logs,
        } => {
            let requirement = match (requirement, requirement_file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
                (None, None) => anyhow::bail!("either --requirement or --requirement-file is required"),
            };
            let workdir = match workdir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    std::fs::canonicalize(dir)?
                }
                None => std::env::current_dir()?,
            };
            let options = RunOptions {
                requirement,
                workdir,
                cycles,
                build: build_runner(build_command, build_timeout_secs),
                logs: logs.unwrap_or_else(default_logs_dir),
                config: EngineConfig {
                    model,
                    max_transitions,
                    dependency_check: dependency_check.into(),
                    diagnostics: diagnostics.markers(),
                    ..EngineConfig::default()
                },
            };
            let status = cmd_run(options).await?;
            if status != TerminalStatus::Success {
                std::process::exit(1);
            }
        }
        Commands::Diagnose { log, diagnostics } => {
            cmd_diagnose(&log, diagnostics)?;
        }
        Commands::Report { logs, transcript } => {
            cmd_report(&logs, transcript).await?;
        }
    }

    Ok(())
}

fn build_runner(command: String, timeout_secs: u64) -> CommandBuildRunner {
    CommandBuildRunner::new(command).with_timeout_ms(timeout_secs.saturating_mul(1000))
}

/// `.fixloop/logs/<UTC timestamp>`, unique per second.
fn default_logs_dir() -> PathBuf {
    PathBuf::from(format!(
        ".fixloop/logs/{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ))
}

async fn cmd_run(options: RunOptions) -> anyhow::Result<TerminalStatus> {
    println!("Project: {}", options.workdir.display());
    println!("Build command: {}", options.build.command);
    println!("Fix cycles: {}", options.cycles);
    println!("Logs: {}", options.logs.display());

    let usage = UsageTracker::new();
    let mut client = LlmClient::new()
        .with_middleware(LoggingMiddleware)
        .with_middleware(usage.clone());
    client.register_provider(fixloop_llm::OpenAiAdapter::from_env()?);

    let env = LocalExecutionEnvironment::new(&options.workdir);
    let engine = Engine::new(client, env, options.build, options.config);
    let state = engine.run(options.requirement, options.cycles).await;

    print_transcript(&state.transcript);

    let report = RunReport::from_state(&state);
    let report_path = save_report(&report, &options.logs).await?;
    tracing::debug!(path = %report_path.display(), "Run report written");

    let status = state.terminal_status().unwrap_or(TerminalStatus::Fatal);
    println!("\nRun finished: {}", status);
    println!(
        "Transitions: {}  Fix cycles: {}  Cycles remaining: {}",
        state.transitions, state.fix_cycles_run, state.cycles_remaining
    );
    println!(
        "Model calls: {}  Tokens in/out: {}/{}",
        usage.calls(),
        usage.total_input_tokens(),
        usage.total_output_tokens()
    );
    if let Some(ref failure) = state.failure {
        println!("Failure: {}", failure);
    }
    if status == TerminalStatus::ExhaustedRetries && !state.build_summary.is_empty() {
        println!("\nLast build diagnostics:\n{}", state.build_summary);
    }
    println!("Report: {}", report_path.display());

    Ok(status)
}

fn print_transcript(transcript: &[Turn]) {
    for turn in transcript {
        match turn {
            Turn::System { .. } => println!("\n=== system ==="),
            Turn::Request { content } => println!("\n=== request ===\n{}", content),
            Turn::Response {
                content,
                tool_calls,
            } => {
                println!("\n=== response ===");
                if !content.is_empty() {
                    println!("{}", content);
                }
                for call in tool_calls {
                    println!("-> {}({})", call.name, call.arguments);
                }
            }
            Turn::ToolResult {
                tool_name,
                content,
                is_error,
                ..
            } => {
                let marker = if *is_error { " (error)" } else { "" };
                println!("\n=== {}{} ===\n{}", tool_name, marker, preview(content, 2_000));
            }
        }
    }
}

fn preview(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn cmd_diagnose(path: &Path, diagnostics: Diagnostics) -> anyhow::Result<()> {
    let log = std::fs::read_to_string(path)?;
    let summary = extract_diagnostics(&log, &diagnostics.markers());
    if summary.is_empty() {
        println!("No build failure marker found in {}", path.display());
    } else {
        println!("{}", summary);
    }
    Ok(())
}

async fn cmd_report(logs: &Path, transcript: bool) -> anyhow::Result<()> {
    let Some(report) = load_report(logs).await? else {
        anyhow::bail!("no run report in {}", logs.display());
    };

    if transcript {
        print_transcript(&report.transcript);
        println!();
    }

    let status = report
        .status
        .map(|status| status.to_string())
        .unwrap_or_else(|| "UNFINISHED".to_string());
    println!("Run {} ({})", report.run_id, report.timestamp);
    println!("Requirement: {}", report.requirement);
    println!("Status: {}", status);
    println!(
        "Transitions: {}  Fix cycles: {}  Cycles remaining: {}",
        report.transitions, report.fix_cycles_run, report.cycles_remaining
    );
    if let Some(ref plan) = report.plan {
        println!("Last plan: {} ({} steps)", plan.summary, plan.len());
        for (index, step) in plan.steps.iter().enumerate() {
            println!("  {}. {}", index + 1, step.description);
        }
    }
    if let Some(ref failure) = report.failure {
        println!("Failure: {}", failure);
    }
    if !report.build_summary.is_empty() {
        println!("\nLast build diagnostics:\n{}", report.build_summary);
    }
    Ok(())
}
