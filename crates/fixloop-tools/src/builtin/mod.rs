//! Built-in project tools.

mod list_project_files;
mod read_file;
mod write_file;

pub use list_project_files::ListProjectFilesTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

/// Pull a required string argument out of a tool call's arguments.
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Value,
    tool: &str,
    key: &str,
) -> fixloop_types::Result<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| fixloop_types::FixloopError::ToolError {
            tool: tool.into(),
            message: format!("{} is required", key),
        })
}
