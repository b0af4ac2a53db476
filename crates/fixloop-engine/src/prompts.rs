//! Natural-language instructions sent to the model in each phase.
//!
//! Templates use `${name}` placeholders filled by [`render`].

use regex::{Captures, Regex};

const PLANNING_SYSTEM: &str = r#"You are a software engineer planning a change to an existing code base.

1. Read the requirement.
2. Use the tools to inspect the project structure and any files relevant to the requirement. Prefer reusing existing code.
3. Produce a step-by-step plan of file changes. Each step should touch one file and be small enough to implement on its own.
4. Review the plan against the requirement and revise it until it is complete.

You can only read files in this phase. When the plan is ready, answer with the plan as JSON and nothing else:

{
  "overview": "One paragraph describing the change",
  "steps": [
    {
      "step": 1,
      "description": "Update the build file",
      "file": "pom.xml",
      "action": "update",
      "changes": "What to add or change and why"
    },
    {
      "step": 2,
      "description": "Create the Booking entity",
      "file": "src/main/java/com/example/Booking.java",
      "action": "create",
      "changes": "Fields, methods and annotations of the new class"
    }
  ]
}"#;

const PLANNING_REQUEST: &str = r#"Plan the code changes needed for this requirement:
${requirement}

Answer with only the JSON plan."#;

const PLANNING_CONTINUE: &str = "Continue planning.";

const IMPLEMENTATION_SYSTEM: &str = r#"You are a software engineer implementing one step of a larger plan.

1. Read the step and inspect the files it affects.
2. Make the change with the write_file tool, always writing the complete file content.
3. Make sure imports and build dependencies required by your change are present.
4. If a tool reports an error, do not assume the operation happened.

When the step is complete, answer with a short summary of what you changed and no tool calls."#;

const IMPLEMENTATION_REQUEST: &str = r#"Implement this step:
${step}"#;

const FIX_SYSTEM: &str = r#"You are a software engineer diagnosing a failed build.

You receive the error and warning lines from the build. Use the tools to read the project and find the root cause of each error, then produce a plan that fixes them.

Guidelines:
- Group related fixes into steps that can be implemented on their own.
- Only include steps that address the build errors.
- Respect the existing structure and naming of the code.

Answer with the plan as JSON and nothing else:

{
  "summary": "What went wrong and how it will be fixed",
  "steps": [
    {
      "id": 1,
      "description": "Add the missing import for java.util.List",
      "affectedFiles": ["src/main/java/com/example/BookingService.java"],
      "dependencies": []
    },
    {
      "id": 2,
      "description": "Match the controller to the new service signature",
      "affectedFiles": ["src/main/java/com/example/BookingController.java"],
      "dependencies": [1]
    }
  ],
  "estimates": {"totalSteps": 2, "complexity": "low"}
}"#;

const FIX_REQUEST: &str = r#"The build failed. Plan the changes that fix these errors:
${build_summary}

Answer with only the JSON plan."#;

const FIX_CONTINUE: &str = "Continue planning the fix.";

/// Every template the engine sends. Replace any of them to change wording.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub planning_system: String,
    /// Placeholders: `requirement`.
    pub planning_request: String,
    pub planning_continue: String,
    pub implementation_system: String,
    /// Placeholders: `step`, `requirement`.
    pub implementation_request: String,
    pub fix_system: String,
    /// Placeholders: `build_summary`, `requirement`.
    pub fix_request: String,
    pub fix_continue: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            planning_system: PLANNING_SYSTEM.into(),
            planning_request: PLANNING_REQUEST.into(),
            planning_continue: PLANNING_CONTINUE.into(),
            implementation_system: IMPLEMENTATION_SYSTEM.into(),
            implementation_request: IMPLEMENTATION_REQUEST.into(),
            fix_system: FIX_SYSTEM.into(),
            fix_request: FIX_REQUEST.into(),
            fix_continue: FIX_CONTINUE.into(),
        }
    }
}

/// Replace each `${key}` in `template` with its value.
///
/// Placeholders are found in the template only. Text coming in through a
/// value (model-written steps, build logs) is copied as-is, `${...}` included.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let placeholder = Regex::new(r"\$\{(\w+)\}").expect("valid regex");
    placeholder
        .replace_all(template, |caps: &Captures| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
