mod directory;

use std::sync::Arc;

use tracing::{debug, info};

use crate::chat::FileEntry;
use crate::config::{env_or, Config};
use crate::error::{GatewayError, Result};

pub use directory::DirectoryTemplateSource;

/// Key/value store holding base project templates.
///
/// Keys are full object keys (prefix included); listing order is not
/// significant.
#[async_trait::async_trait]
pub trait TemplateSource: Send + Sync {
    /// Human-readable name of this store, used in logs.
    fn name(&self) -> &str;

    async fn list_template_files(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn get_file_content(&self, bucket: &str, key: &str) -> Result<String>;
}

/// Loads the configured base template from a [`TemplateSource`].
#[derive(Clone)]
pub struct TemplateLoader {
    source: Arc<dyn TemplateSource>,
    bucket: String,
    prefix: String,
}

impl TemplateLoader {
    pub fn new(source: Arc<dyn TemplateSource>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            source,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Build a directory-backed loader from config.
    ///
    /// `TEMPLATE_ROOT`, `TEMPLATE_BUCKET` and `TEMPLATE_PREFIX` override the
    /// `[template]` section.
    pub fn from_config(config: &Config) -> Self {
        let root = env_or("TEMPLATE_ROOT", &config.template.root)
            .unwrap_or_else(|| "templates".to_string());
        let bucket = env_or("TEMPLATE_BUCKET", &config.template.bucket).unwrap_or_default();
        // An empty prefix is legitimate (template at the bucket root).
        let prefix = std::env::var("TEMPLATE_PREFIX").unwrap_or_else(|_| config.template.prefix.clone());

        info!(root = %root, bucket = %bucket, prefix = %prefix, "template source configured");

        Self::new(Arc::new(DirectoryTemplateSource::new(root)), bucket, prefix)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fetch every template file, with the prefix stripped from each path.
    ///
    /// Any listing or read failure aborts the whole load; no partial
    /// template is returned.
    pub async fn load(&self) -> Result<Vec<FileEntry>> {
        let keys = self
            .source
            .list_template_files(&self.bucket, &self.prefix)
            .await?;

        let mut files = Vec::with_capacity(keys.len());
        for key in keys {
            // Directory placeholder objects carry no content.
            if key.ends_with('/') {
                continue;
            }
            let path = key.strip_prefix(self.prefix.as_str()).ok_or_else(|| {
                GatewayError::Template(format!(
                    "key \"{key}\" listed outside prefix \"{}\"",
                    self.prefix
                ))
            })?;
            let content = self.source.get_file_content(&self.bucket, &key).await?;
            files.push(FileEntry {
                path: path.to_string(),
                content,
            });
        }

        debug!(
            source = self.source.name(),
            bucket = %self.bucket,
            files = files.len(),
            "template loaded"
        );

        Ok(files)
    }
}
