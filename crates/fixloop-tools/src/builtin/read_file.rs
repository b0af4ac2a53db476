use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use super::required_str;
use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};
use crate::truncation::{truncate_output, TruncationMode};

const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a project file and return its full content.".to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path of the file, relative to the project root"
                    }
                }
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        env: &dyn ExecutionEnvironment,
    ) -> fixloop_types::Result<String> {
        let file_path = required_str(&arguments, "read_file", "file_path")?;

        let content = env.read_file(Path::new(file_path)).await.map_err(|e| {
            fixloop_types::FixloopError::ToolError {
                tool: "read_file".into(),
                message: format!("could not read {}: {}", file_path, e),
            }
        })?;

        Ok(truncate_output(&content, MAX_OUTPUT_CHARS, TruncationMode::HeadTail))
    }
}
