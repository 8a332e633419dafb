use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::backends::FileSystem;
use crate::constants::{
    SNIPPET_MAX_FILE_BYTES, SNIPPET_MAX_LINE_CHARS, SNIPPET_MAX_LINES, TEXT_MIME_TYPES,
};
use crate::models::{DownloadRecord, IconKind, Preview};
use crate::utils::{extension_of, is_image_extension};

/// Decides what a finished download's preview shows.
///
/// Any failure along the way degrades to the generic icon for the
/// content type; resolving a preview never fails.
#[derive(Debug, Clone)]
pub struct PreviewResolver {
    fs: Arc<dyn FileSystem>,
}

impl PreviewResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    pub async fn resolve(&self, record: &DownloadRecord) -> Preview {
        let content_type = record.content_type.as_deref().map(str::to_ascii_lowercase);
        let icon = Preview::Icon(IconKind::for_content_type(content_type.as_deref()));

        let Some(path) = record.path.as_deref() else {
            return icon;
        };

        if let Some(content_type) = content_type.as_deref()
            && TEXT_MIME_TYPES.contains(&content_type)
        {
            return match self.text_snippet(path).await {
                Some(snippet) => Preview::Text { snippet },
                None => icon,
            };
        }

        let image_by_extension = path
            .file_name()
            .and_then(|name| extension_of(&name.to_string_lossy()))
            .is_some_and(|ext| is_image_extension(&ext));
        let image_by_type = content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"));

        if image_by_type || image_by_extension {
            if !self.fs.exists(path).await {
                debug!("Image preview source missing: {:?}", path);
                return Preview::Icon(IconKind::Image);
            }
            return match url::Url::from_file_path(path) {
                Ok(url) => Preview::Image {
                    url: url.to_string(),
                },
                Err(()) => Preview::Icon(IconKind::Image),
            };
        }

        icon
    }

    async fn text_snippet(&self, path: &Path) -> Option<String> {
        let size = match self.fs.size(path).await {
            Ok(size) => size,
            Err(e) => {
                debug!("No text preview for {:?}: {}", path, e);
                return None;
            }
        };

        if size == 0 {
            return Some("[Empty file]".to_string());
        }
        if size > SNIPPET_MAX_FILE_BYTES {
            return Some("[File too large for preview]".to_string());
        }

        let bytes = match self.fs.read_bytes(path, SNIPPET_MAX_FILE_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Failed to read {:?} for preview: {}", path, e);
                return None;
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        trace!("Building snippet from {} bytes", bytes.len());
        Some(build_snippet(&text))
    }
}

/// First lines of `text`, each trimmed at the end and cut to a fixed width
pub fn build_snippet(text: &str) -> String {
    text.lines()
        .take(SNIPPET_MAX_LINES)
        .map(|line| {
            let line = line.trim_end();
            if line.chars().count() > SNIPPET_MAX_LINE_CHARS {
                let cut: String = line.chars().take(SNIPPET_MAX_LINE_CHARS).collect();
                format!("{}...", cut)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
