use serde::{Deserialize, Serialize};

/// Generic icon shown when no richer preview is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IconKind {
    Image,
    Video,
    Audio,
    Text,
    Pdf,
    Archive,
    Application,
    Generic,
}

impl IconKind {
    /// Pick an icon from a MIME content type
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Generic;
        };
        let content_type = content_type.to_ascii_lowercase();

        if content_type.contains("image/") {
            Self::Image
        } else if content_type.contains("video/") {
            Self::Video
        } else if content_type.contains("audio/") {
            Self::Audio
        } else if content_type.contains("text/") {
            Self::Text
        } else if content_type.contains("application/pdf") {
            Self::Pdf
        } else if content_type.contains("application/zip")
            || content_type.contains("application/x-rar")
        {
            Self::Archive
        } else if content_type.contains("application/") {
            Self::Application
        } else {
            Self::Generic
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Image => "🖼️",
            Self::Video => "🎬",
            Self::Audio => "🎵",
            Self::Text => "📝",
            Self::Pdf => "📕",
            Self::Archive => "🗜️",
            Self::Application => "📦",
            Self::Generic => "📄",
        }
    }
}

/// What the pod's preview area shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preview {
    /// Thumbnail of an image file, addressed by `file://` URL
    Image { url: String },
    /// First lines of a text file
    Text { snippet: String },
    Icon(IconKind),
}

impl Default for Preview {
    fn default() -> Self {
        Self::Icon(IconKind::Generic)
    }
}
