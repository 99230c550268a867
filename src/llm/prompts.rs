use serde::Serialize;

use crate::chat::{FileEntry, Message, Role};
use crate::llm::FileContext;

/// Bumped whenever the wording of [`SYSTEM_PROMPT`] changes.
pub const SYSTEM_PROMPT_VERSION: &str = "2025-03-1";

const PROJECT_FILES_HEADING: &str = "Current project files:";
const TEMPLATE_FILES_HEADING: &str = "Base template files:";
const USER_INSTRUCTION_SEPARATOR: &str = "\n\nUser Instruction: ";

/// Fixed instructions sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = r#"
You are AI Web Gen, an AI editor that creates and modifies websites built as a React + Vite TypeScript app.
You help users by chatting with them and changing their code in real time.

## Your Environment

The user sees a live preview of the application (running in WebContainer) next to the chat while you work.
The frontend you talk to is a React application that owns the file system and the live preview.
It runs build and dev commands itself and applies the file operations and commands found in your replies.
You reply in natural language and include metadata tags that the frontend parses into file operations.
Never run `npm run dev` after making changes; the frontend restarts the preview automatically.

## Guidelines for Interactions

Not every message needs code changes. Discussing, explaining concepts and giving guidance are all fine.
When code changes are needed, make efficient, maintainable and readable updates.
Be friendly and clear whether you are changing code or just chatting.
When asked about the current state of the application, summarize the current project files and their contents.
When asked to do something outside your scope, politely explain that you can only create or modify the application.

## Response Format and Actions

- Start with a short natural language description of what you are building
- Use Markdown for prose, but never inside Artifact or Action tags
- Keep explanations brief and non-technical; the end users are not developers
- Wrap file operations in <Artifact id="unique-id" title="Action Description">
- Use <Action type="file" filePath="path/to/file" contentType="create">{the file content}</Action> for new files
- Use <Action type="file" filePath="path/to/file" contentType="replace">{the file content}</Action> for updated files
- Use <Action type="file" filePath="path/to/file" contentType="delete">{the file content}</Action> for deleted files
- Close with </Artifact>
- Wrap commands in <Artifact id="unique-id" title="Action Description">
- Use <Action type="command" targetDir="/app" command="command to run"> for terminal commands
- Close with </Artifact>

## Example response

<your_response_example>
I'll create a simple Hello World app that is visually appealing and responsive.

Let me create the necessary files for you:
<Artifact id="create-hello-world" title="Create Hello World App">
<Action type="file" filePath="app/src/components/HelloWorld.tsx" contentType="create">{code}</Action>
<Action type="file" filePath="app/src/App.tsx" contentType="replace">{code}</Action>
</Artifact>

I've created a simple "Hello World" app that displays a greeting message.
</your_response_example>

---
# Web Application Guidelines

Important: all web application code lives in the /app directory.

When creating or modifying an application:
- Always output the entire file, never a diff (no @@, - or + prefixes); your output replaces the file verbatim
- Start from the base template or the current project files provided below
- Extend or modify them according to the user's instructions
- Keep components small and focused (< 70 lines)
- Put every file operation inside Artifact tags with Action elements
- Aim for production-ready, modern, beautiful and responsive UI
- Follow accessibility, performance and maintainability best practices
- Use TypeScript

## Project Structure
<structure>
- app/src/
  - components/ (one level deep)
  - utils/ (one level deep)
  - {other directories as needed}
</structure>

## Constraints
- Do not create or modify files outside the src/ directory
- Do not create unit tests or integration tests
- Do not create backend code or APIs
- Do not create non-React code (e.g. Python, Java)
- Do not create non-web applications (e.g. mobile or desktop apps)
- Do not create non-UI code (e.g. database schemas, server configuration)
- Do not require complex build configuration or custom Webpack setups
- Do not require server-side rendering or complex routing setups
- Do not add advanced state management libraries (e.g. Redux, MobX)
- Do not generate images, videos or other media files
- Do not generate icons or SVGs; use lucide-react icons, which are already installed

---
## General Guidelines

## Constraints
- Do not run actions while writing code.
- Only run actions when the user explicitly asks for them.

---
"#;

/// A message as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// System instructions followed by the serialized file context, if any.
pub fn system_block(context: &FileContext) -> String {
    let (heading, files) = match context {
        FileContext::Project(files) => (PROJECT_FILES_HEADING, files),
        FileContext::Template(files) => (TEMPLATE_FILES_HEADING, files),
        FileContext::None => return SYSTEM_PROMPT.to_string(),
    };
    format!("{SYSTEM_PROMPT}\n\n{heading}\n{}", serialize_files(files))
}

/// Pretty-printed JSON array of `{path, content}` records.
fn serialize_files(files: &[FileEntry]) -> String {
    // Serializing plain string pairs cannot fail.
    serde_json::to_string_pretty(files).unwrap_or_else(|_| "[]".to_string())
}

/// Build the message list sent to the model.
///
/// The provider has no separate system slot here, so the system block is
/// prefixed onto the first message when that message is from the user.
/// Length and order always match `messages`; only index 0 can differ.
pub fn assemble(messages: &[Message], context: &FileContext) -> Vec<PromptMessage> {
    let mut out: Vec<PromptMessage> = messages
        .iter()
        .map(|m| PromptMessage {
            role: m.role,
            content: m.content.clone(),
        })
        .collect();

    if let Some(first) = out.first_mut().filter(|m| m.role == Role::User) {
        first.content = format!(
            "{}{USER_INSTRUCTION_SEPARATOR}{}",
            system_block(context),
            first.content
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, role: Role, content: &str) -> Message {
        Message {
            id: id.into(),
            role,
            content: content.into(),
        }
    }

    fn files() -> Vec<FileEntry> {
        vec![FileEntry {
            path: "app/src/App.tsx".into(),
            content: "export const App = () => <h1>\"hi\"</h1>;\n".into(),
        }]
    }

    fn conversation() -> Vec<Message> {
        vec![
            msg("1", Role::User, "build a todo app"),
            msg("2", Role::Assistant, "Sure!"),
            msg("3", Role::User, "make it blue"),
        ]
    }

    #[test]
    fn system_prompt_states_constraints() {
        assert!(SYSTEM_PROMPT.contains("<Artifact id="));
        assert!(SYSTEM_PROMPT.contains("Do not create unit tests"));
        assert!(SYSTEM_PROMPT.contains("Do not create backend code"));
        assert!(SYSTEM_PROMPT.contains("Do not generate icons"));
        assert!(SYSTEM_PROMPT.contains("Only run actions when the user explicitly asks"));
    }

    #[test]
    fn no_context_means_no_file_section() {
        let block = system_block(&FileContext::None);
        assert_eq!(block, SYSTEM_PROMPT);
        assert!(!block.contains(PROJECT_FILES_HEADING));
        assert!(!block.contains(TEMPLATE_FILES_HEADING));
    }

    #[test]
    fn project_context_is_labelled_and_verbatim() {
        let block = system_block(&FileContext::Project(files()));
        assert!(block.contains(PROJECT_FILES_HEADING));
        assert!(!block.contains(TEMPLATE_FILES_HEADING));
        let json = block.split(PROJECT_FILES_HEADING).nth(1).unwrap().trim();
        let parsed: Vec<FileEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, files());
    }

    #[test]
    fn template_context_is_labelled() {
        let block = system_block(&FileContext::Template(files()));
        assert!(block.contains(TEMPLATE_FILES_HEADING));
        assert!(!block.contains(PROJECT_FILES_HEADING));
        assert!(block.contains("\"path\": \"app/src/App.tsx\""));
    }

    #[test]
    fn only_first_user_message_is_prefixed() {
        let input = conversation();
        let out = assemble(&input, &FileContext::None);
        assert_eq!(out.len(), input.len());
        assert_eq!(
            out[0].content,
            format!("{SYSTEM_PROMPT}\n\nUser Instruction: build a todo app")
        );
        for (o, i) in out.iter().zip(&input).skip(1) {
            assert_eq!(o.role, i.role);
            assert_eq!(o.content, i.content);
        }
    }

    #[test]
    fn assistant_first_message_is_untouched() {
        let input = vec![msg("1", Role::Assistant, "hello"), msg("2", Role::User, "hi")];
        let out = assemble(&input, &FileContext::Project(files()));
        assert_eq!(out[0].content, "hello");
        assert_eq!(out[1].content, "hi");
    }

    #[test]
    fn empty_conversation_is_fine() {
        assert!(assemble(&[], &FileContext::Template(files())).is_empty());
    }

    #[test]
    fn assembly_is_deterministic() {
        let ctx = FileContext::Template(files());
        let a = serde_json::to_vec(&assemble(&conversation(), &ctx)).unwrap();
        let b = serde_json::to_vec(&assemble(&conversation(), &ctx)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn prompt_messages_serialize_lowercase_roles() {
        let out = assemble(&[msg("1", Role::Assistant, "x")], &FileContext::None);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "assistant", "content": "x"}]));
    }
}
