use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result of executing a shell command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Abstraction over the project workspace that tools operate in.
///
/// Paths handed to these methods are relative to [`working_directory`]
/// unless they are absolute paths inside it.
///
/// [`working_directory`]: ExecutionEnvironment::working_directory
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    async fn read_file(&self, path: &Path) -> fixloop_types::Result<String>;
    async fn write_file(&self, path: &Path, content: &str) -> fixloop_types::Result<()>;
    /// Every non-hidden file below `path`, relative to the working directory, sorted.
    async fn list_files(&self, path: &Path) -> fixloop_types::Result<Vec<PathBuf>>;
    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
    ) -> fixloop_types::Result<ExecResult>;
    fn working_directory(&self) -> &Path;
}
