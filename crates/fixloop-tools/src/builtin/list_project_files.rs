use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};
use crate::truncation::{truncate_output, TruncationMode};

const MAX_OUTPUT_CHARS: usize = 20_000;

pub struct ListProjectFilesTool;

#[async_trait]
impl Tool for ListProjectFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_project_files".to_string(),
            description:
                "List every file in the project (hidden files excluded), one path per line, relative to the project root."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        env: &dyn ExecutionEnvironment,
    ) -> fixloop_types::Result<String> {
        let files = env.list_files(Path::new("")).await?;
        if files.is_empty() {
            return Ok("(project is empty)".to_string());
        }

        let output = files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(truncate_output(&output, MAX_OUTPUT_CHARS, TruncationMode::HeadTail))
    }
}
