use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use fixloop_types::FixloopError;
use tokio::io::AsyncReadExt;

use crate::environment::{ExecResult, ExecutionEnvironment};

/// Execution environment rooted at a project directory on the local filesystem.
pub struct LocalExecutionEnvironment {
    root: PathBuf,
}

impl LocalExecutionEnvironment {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `path` against the project root, refusing anything that
    /// would land outside it.
    fn resolve(&self, path: &Path) -> fixloop_types::Result<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).map_err(|_| outside_root(path))?
        } else {
            path
        };

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(outside_root(path));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => return Err(outside_root(path)),
            }
        }
        Ok(resolved)
    }

    /// Filter environment variables, removing secrets and keeping safe defaults.
    fn filtered_env() -> Vec<(String, String)> {
        let exclude_suffixes: &[&str] = &[
            "_api_key",
            "_secret",
            "_token",
            "_password",
            "_credential",
        ];

        std::env::vars()
            .filter(|(key, _)| {
                let lower = key.to_lowercase();
                !exclude_suffixes.iter().any(|s| lower.ends_with(s))
            })
            .collect()
    }
}

fn outside_root(path: &Path) -> FixloopError {
    FixloopError::ToolError {
        tool: "environment".into(),
        message: format!("path '{}' is outside the project root", path.display()),
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalExecutionEnvironment {
    async fn read_file(&self, path: &Path) -> fixloop_types::Result<String> {
        let resolved = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    async fn write_file(&self, path: &Path, content: &str) -> fixloop_types::Result<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(tokio::fs::write(&resolved, content).await?)
    }

    async fn list_files(&self, path: &Path) -> fixloop_types::Result<Vec<PathBuf>> {
        let resolved = self.resolve(path)?;
        if !tokio::fs::try_exists(&resolved).await? {
            tokio::fs::create_dir_all(&resolved).await?;
        }
        if !tokio::fs::metadata(&resolved).await?.is_dir() {
            return Err(FixloopError::ToolError {
                tool: "list_project_files".into(),
                message: format!("{} is not a directory", path.display()),
            });
        }

        let mut files = Vec::new();
        collect_files(&self.root, &resolved, &mut files).await?;
        files.sort();
        Ok(files)
    }

    async fn exec_command(
        &self,
        command: &str,
        timeout_ms: u64,
    ) -> fixloop_types::Result<ExecResult> {
        let mut cmd = tokio::process::Command::new("bash");
        cmd.args(["-c", command])
            .current_dir(&self.root)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env_clear()
            .envs(Self::filtered_env());

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let start = tokio::time::Instant::now();
        let mut child = cmd.spawn()?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            FixloopError::Other("child stdout was not captured".into())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            FixloopError::Other("child stderr was not captured".into())
        })?;

        // Drain both pipes while waiting so a chatty build cannot fill them and stall.
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let timeout_dur = std::time::Duration::from_millis(timeout_ms);

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let stdout_buf = stdout_task.await.unwrap_or_default();
                let stderr_buf = stderr_task.await.unwrap_or_default();

                Ok(ExecResult {
                    stdout: String::from_utf8_lossy(&stdout_buf).to_string(),
                    stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
                    exit_code: status.code().unwrap_or(-1),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            _ = tokio::time::sleep(timeout_dur) => {
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        // SAFETY: signalling our own child's process group.
                        unsafe { libc::kill(-(pid as i32), libc::SIGTERM); }
                    }
                    tokio::select! {
                        _ = child.wait() => {}
                        _ = tokio::time::sleep(std::time::Duration::from_secs(2)) => {
                            let _ = child.kill().await;
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.kill().await;
                }
                stdout_task.abort();
                stderr_task.abort();

                Ok(ExecResult {
                    stdout: String::new(),
                    stderr: format!("Command timed out after {}ms", timeout_ms),
                    exit_code: -1,
                    timed_out: true,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        }
    }

    fn working_directory(&self) -> &Path {
        &self.root
    }
}

/// Recursively collect non-hidden files below `current`, relative to `root`.
async fn collect_files(
    root: &Path,
    current: &Path,
    files: &mut Vec<PathBuf>,
) -> fixloop_types::Result<()> {
    let mut read_dir = tokio::fs::read_dir(current).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            Box::pin(collect_files(root, &path, files)).await?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(())
}
