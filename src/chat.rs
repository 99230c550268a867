//! Request and response shapes exchanged with the editor frontend.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation, in the order the frontend sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub is_first_prompt: bool,
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_files: Option<ProjectFiles>,
}

/// Live file state of the project being edited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFiles {
    #[serde(default)]
    pub visible: Vec<VisibleFile>,
    /// Paths the frontend keeps out of the model's view.
    #[serde(default)]
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleFile {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub last_modified: u64,
}

/// A whole file as embedded in the model context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl From<&VisibleFile> for FileEntry {
    fn from(f: &VisibleFile) -> Self {
        Self {
            path: f.path.clone(),
            content: f.content.clone(),
        }
    }
}

/// Unary chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub id: String,
    pub role: Role,
}

impl ChatResponse {
    /// Wrap model output as an assistant turn with a fresh id.
    pub fn assistant(content: String) -> Self {
        Self {
            content,
            id: uuid::Uuid::new_v4().simple().to_string(),
            role: Role::Assistant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_frontend_request() {
        let json = r#"{
            "messages": [
                {"id": "m1", "role": "user", "content": "make it blue"},
                {"id": "m2", "role": "assistant", "content": "done"}
            ],
            "isFirstPrompt": false,
            "projectId": "p-42",
            "projectFiles": {
                "visible": [{"path": "app/src/App.tsx", "content": "x", "lastModified": 1718000000000}],
                "hidden": ["app/package-lock.json"]
            }
        }"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, Role::Assistant);
        assert!(!req.is_first_prompt);
        assert_eq!(req.project_id, "p-42");
        let files = req.project_files.unwrap();
        assert_eq!(files.visible[0].path, "app/src/App.tsx");
        assert_eq!(files.visible[0].last_modified, 1_718_000_000_000);
        assert_eq!(files.hidden, vec!["app/package-lock.json"]);
    }

    #[test]
    fn project_files_are_optional() {
        let json = r#"{"messages": [], "isFirstPrompt": true, "projectId": "p"}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert!(req.is_first_prompt);
        assert!(req.project_files.is_none());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let json = r#"{"messages": [{"id": "1", "role": "system", "content": "x"}], "isFirstPrompt": true, "projectId": "p"}"#;
        assert!(serde_json::from_str::<ChatRequest>(json).is_err());
    }

    #[test]
    fn roles_render_lowercase() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(Role::Assistant).unwrap(), "assistant");
    }

    #[test]
    fn assistant_response_has_fresh_id() {
        let a = ChatResponse::assistant("Done".into());
        let b = ChatResponse::assistant("Done".into());
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Done");
    }
}
