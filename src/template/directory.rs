use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{GatewayError, Result};
use crate::template::TemplateSource;

/// Template store backed by a local directory tree.
///
/// Each bucket is a sub-directory of `root`; object keys are the
/// `/`-separated paths of regular files relative to the bucket directory.
pub struct DirectoryTemplateSource {
    root: PathBuf,
}

impl DirectoryTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if !is_plain_relative(Path::new(bucket)) || bucket.contains('/') {
            return Err(GatewayError::Template(format!("invalid bucket name \"{bucket}\"")));
        }
        let dir = self.root.join(bucket);
        if !dir.is_dir() {
            return Err(GatewayError::Template(format!(
                "bucket directory not found: {}",
                dir.display()
            )));
        }
        Ok(dir)
    }
}

/// True if `path` is relative and never steps outside its base.
fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait::async_trait]
impl TemplateSource for DirectoryTemplateSource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn list_template_files(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.bucket_dir(bucket)?;
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut keys = Vec::new();
            for entry in WalkDir::new(&dir).follow_links(false) {
                let entry = entry.map_err(|e| GatewayError::Template(format!("walk failed: {e}")))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&dir) else {
                    continue;
                };
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
        .map_err(|e| GatewayError::Template(format!("listing task failed: {e}")))??;

        debug!(bucket, keys = keys.len(), "template keys listed");
        Ok(keys)
    }

    async fn get_file_content(&self, bucket: &str, key: &str) -> Result<String> {
        let dir = self.bucket_dir(bucket)?;
        if !is_plain_relative(Path::new(key)) {
            return Err(GatewayError::Template(format!("invalid key \"{key}\"")));
        }
        let bytes = tokio::fs::read(dir.join(key))
            .await
            .map_err(|e| GatewayError::Template(format!("failed to read \"{key}\": {e}")))?;

        // Binary assets (icons, images) decode lossily.
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!(key, "non-UTF-8 template file, decoding lossily");
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}
