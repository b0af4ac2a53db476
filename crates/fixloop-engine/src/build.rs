//! Build invocation and marker-gated diagnostic extraction.

use async_trait::async_trait;
use fixloop_tools::ExecutionEnvironment;
use regex::Regex;

// ---------------------------------------------------------------------------
// BuildOutcome / BuildRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded { log: String },
    /// The build ran and reported failure.
    Failed { log: String },
    /// The build tool itself could not be run.
    Unavailable { message: String },
}

#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn build(&self, env: &dyn ExecutionEnvironment) -> BuildOutcome;
}

/// Exit status bash uses when the command is not found.
const COMMAND_NOT_FOUND: i32 = 127;

/// Runs a shell command in the project root.
#[derive(Debug, Clone)]
pub struct CommandBuildRunner {
    pub command: String,
    pub timeout_ms: u64,
}

impl CommandBuildRunner {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_ms: 600_000,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for CommandBuildRunner {
    fn default() -> Self {
        Self::new("mvn clean install")
    }
}

#[async_trait]
impl BuildRunner for CommandBuildRunner {
    async fn build(&self, env: &dyn ExecutionEnvironment) -> BuildOutcome {
        tracing::info!(command = %self.command, "Running build");
        let result = match env.exec_command(&self.command, self.timeout_ms).await {
            Ok(result) => result,
            Err(e) => {
                return BuildOutcome::Unavailable {
                    message: e.to_string(),
                }
            }
        };

        if result.timed_out {
            return BuildOutcome::Unavailable {
                message: format!("'{}' timed out after {}ms", self.command, self.timeout_ms),
            };
        }
        if result.exit_code == COMMAND_NOT_FOUND {
            return BuildOutcome::Unavailable {
                message: result.combined_output().trim().to_string(),
            };
        }

        tracing::debug!(exit_code = result.exit_code, duration_ms = result.duration_ms, "Build finished");
        let log = result.combined_output();
        if result.success() {
            BuildOutcome::Succeeded { log }
        } else {
            BuildOutcome::Failed { log }
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Patterns recognizing a build tool's output.
#[derive(Debug, Clone)]
pub struct DiagnosticMarkers {
    /// Matches anywhere in a line; gates extraction.
    pub failure: Regex,
    pub error: Regex,
    pub warning: Regex,
}

impl DiagnosticMarkers {
    pub fn new(failure: &str, error: &str, warning: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            failure: Regex::new(failure)?,
            error: Regex::new(error)?,
            warning: Regex::new(warning)?,
        })
    }

    pub fn maven() -> Self {
        Self {
            failure: Regex::new(r"BUILD FAILURE").expect("valid regex"),
            error: Regex::new(r"^\[ERROR\]").expect("valid regex"),
            warning: Regex::new(r"^\[WARNING\]").expect("valid regex"),
        }
    }

    pub fn cargo() -> Self {
        Self {
            failure: Regex::new(r"^error: (could not compile|test failed)").expect("valid regex"),
            error: Regex::new(r"^error(\[E\d+\])?:").expect("valid regex"),
            warning: Regex::new(r"^warning:").expect("valid regex"),
        }
    }
}

impl Default for DiagnosticMarkers {
    fn default() -> Self {
        Self::maven()
    }
}

/// Pull error and warning lines out of a failed build log.
///
/// Returns an empty string unless some line carries the failure marker.
pub fn extract_diagnostics(log: &str, markers: &DiagnosticMarkers) -> String {
    let lines: Vec<&str> = log.lines().collect();
    if !lines.iter().any(|line| markers.failure.is_match(line)) {
        return String::new();
    }

    let errors: Vec<&str> = lines
        .iter()
        .filter(|line| markers.error.is_match(line))
        .map(|line| line.trim())
        .collect();
    let warnings: Vec<&str> = lines
        .iter()
        .filter(|line| markers.warning.is_match(line))
        .map(|line| line.trim())
        .collect();

    let mut formatted = Vec::new();
    if !errors.is_empty() {
        formatted.push("=== ERRORS ===");
        formatted.extend(errors);
    }
    if !warnings.is_empty() {
        formatted.push("\n=== WARNINGS ===");
        formatted.extend(warnings);
    }
    formatted.join("\n")
}
