//! Tool trait, built-in project tools, and execution environment for fixloop.
//!
//! Provides `Tool` trait, `ToolRegistry`, `ExecutionEnvironment` trait,
//! `LocalExecutionEnvironment` implementation, the three built-in project
//! tools (read_file, list_project_files, write_file), and the per-phase
//! `ToolProfile`s.

pub mod builtin;
pub mod environment;
pub mod local_env;
pub mod profiles;
pub mod tool;
pub mod truncation;

pub use builtin::{ListProjectFilesTool, ReadFileTool, WriteFileTool};
pub use environment::{ExecResult, ExecutionEnvironment};
pub use local_env::LocalExecutionEnvironment;
pub use profiles::ToolProfile;
pub use tool::{Tool, ToolDefinition, ToolRegistry};
