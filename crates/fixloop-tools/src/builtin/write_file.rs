use std::path::Path;

use async_trait::async_trait;
use serde_json::json;

use super::required_str;
use crate::environment::ExecutionEnvironment;
use crate::tool::{Tool, ToolDefinition};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".to_string(),
            description:
                "Create or overwrite a project file with the given content, creating parent directories if needed."
                    .to_string(),
            parameters: json!({
                "type": "object",
                "required": ["file_path", "content"],
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path of the file, relative to the project root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Complete new content of the file"
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
        let file_path = required_str(&arguments, "write_file", "file_path")?;
        let content = required_str(&arguments, "write_file", "content")?;

        env.write_file(Path::new(file_path), content).await?;

        Ok(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            file_path
        ))
    }
}
