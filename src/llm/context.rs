use tracing::debug;

use crate::chat::{ChatRequest, FileEntry};
use crate::error::Result;
use crate::template::TemplateLoader;

/// Files embedded into the system instructions for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContext {
    /// The project's current visible files.
    Project(Vec<FileEntry>),
    /// The base template, for the first prompt of a new project.
    Template(Vec<FileEntry>),
    /// Conversational turn without file context.
    None,
}

impl FileContext {
    pub fn kind(&self) -> &'static str {
        match self {
            FileContext::Project(_) => "project",
            FileContext::Template(_) => "template",
            FileContext::None => "none",
        }
    }

    pub fn files(&self) -> &[FileEntry] {
        match self {
            FileContext::Project(files) | FileContext::Template(files) => files,
            FileContext::None => &[],
        }
    }
}

/// Pick the file context for `request`.
///
/// Non-empty visible project files always win over the template, whatever
/// `is_first_prompt` says.  The template is only fetched for a first prompt.
pub async fn select_context(request: &ChatRequest, templates: &TemplateLoader) -> Result<FileContext> {
    let visible = request
        .project_files
        .as_ref()
        .map(|p| p.visible.as_slice())
        .unwrap_or_default();

    let context = if !visible.is_empty() {
        FileContext::Project(visible.iter().map(FileEntry::from).collect())
    } else if request.is_first_prompt {
        FileContext::Template(templates.load().await?)
    } else {
        FileContext::None
    };

    debug!(
        project_id = %request.project_id,
        context = context.kind(),
        files = context.files().len(),
        "context selected"
    );

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::chat::{Message, ProjectFiles, Role, VisibleFile};
    use crate::template::tests::MemorySource;

    fn request(is_first_prompt: bool, visible: Option<Vec<(&str, &str)>>) -> ChatRequest {
        ChatRequest {
            messages: vec![Message {
                id: "1".into(),
                role: Role::User,
                content: "hi".into(),
            }],
            is_first_prompt,
            project_id: "p".into(),
            project_files: visible.map(|files| ProjectFiles {
                visible: files
                    .into_iter()
                    .map(|(path, content)| VisibleFile {
                        path: path.into(),
                        content: content.into(),
                        last_modified: 0,
                    })
                    .collect(),
                hidden: vec![],
            }),
        }
    }

    fn templates() -> TemplateLoader {
        let source = MemorySource::with(&[("tpl/app/index.html", "<template/>")]);
        TemplateLoader::new(Arc::new(source), "b", "tpl/")
    }

    fn failing_templates() -> TemplateLoader {
        let mut source = MemorySource::with(&[]);
        source.fail = true;
        TemplateLoader::new(Arc::new(source), "b", "tpl/")
    }

    #[tokio::test]
    async fn visible_files_win_on_first_prompt() {
        let req = request(true, Some(vec![("app/src/App.tsx", "live")]));
        let ctx = select_context(&req, &templates()).await.unwrap();
        assert_eq!(
            ctx,
            FileContext::Project(vec![FileEntry {
                path: "app/src/App.tsx".into(),
                content: "live".into()
            }])
        );
    }

    #[tokio::test]
    async fn visible_files_used_on_continuation() {
        let req = request(false, Some(vec![("a.ts", "1"), ("b.ts", "2")]));
        let ctx = select_context(&req, &templates()).await.unwrap();
        assert_eq!(ctx.kind(), "project");
        let paths: Vec<_> = ctx.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "b.ts"]);
    }

    #[tokio::test]
    async fn visible_files_never_touch_template_store() {
        let req = request(true, Some(vec![("a.ts", "1")]));
        assert!(select_context(&req, &failing_templates()).await.is_ok());
    }

    #[tokio::test]
    async fn first_prompt_without_files_uses_template() {
        let ctx = select_context(&request(true, None), &templates()).await.unwrap();
        assert_eq!(
            ctx,
            FileContext::Template(vec![FileEntry {
                path: "app/index.html".into(),
                content: "<template/>".into()
            }])
        );
    }

    #[tokio::test]
    async fn empty_visible_list_falls_through_to_template() {
        let ctx = select_context(&request(true, Some(vec![])), &templates()).await.unwrap();
        assert_eq!(ctx.kind(), "template");
    }

    #[tokio::test]
    async fn continuation_without_files_has_no_context() {
        let ctx = select_context(&request(false, None), &failing_templates()).await.unwrap();
        assert_eq!(ctx, FileContext::None);
        assert!(ctx.files().is_empty());
    }

    #[tokio::test]
    async fn template_failure_propagates() {
        assert!(select_context(&request(true, None), &failing_templates()).await.is_err());
    }
}
