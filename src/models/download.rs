use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::HostId;

/// State of a download as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    /// Transfer in progress (or paused, the host does not distinguish)
    Downloading,
    /// Transfer finished and the file is on disk
    Succeeded,
    /// Transfer failed
    Errored,
    /// Transfer was canceled
    Canceled,
}

impl DownloadState {
    /// Terminal states always reach the UI, even when throttled
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Succeeded => "succeeded",
            Self::Errored => "errored",
            Self::Canceled => "canceled",
        }
    }
}

/// Last-seen snapshot of a download owned by the host service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub host_id: Option<HostId>,
    pub path: Option<PathBuf>,
    pub source_url: String,
    pub content_type: Option<String>,
    pub current_bytes: u64,
    pub total_bytes: Option<u64>,
    pub state: DownloadState,
    pub error_message: Option<String>,
    pub suggested_name: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn new(source_url: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            host_id: None,
            path: None,
            source_url: source_url.into(),
            content_type: None,
            current_bytes: 0,
            total_bytes: None,
            state: DownloadState::Downloading,
            error_message: None,
            suggested_name: None,
            started_at,
        }
    }

    pub fn with_host_id(mut self, id: impl Into<HostId>) -> Self {
        self.host_id = Some(id.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_progress(mut self, current: u64, total: Option<u64>) -> Self {
        self.current_bytes = current;
        self.total_bytes = total;
        self
    }

    pub fn with_state(mut self, state: DownloadState) -> Self {
        self.state = state;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.state = DownloadState::Errored;
        self.error_message = Some(message.into());
        self
    }

    /// File name of the current on-disk location
    pub fn file_name(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Name shown on the pod: AI name, then file name, then the last URL
    /// segment, then a placeholder.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.suggested_name.as_ref().filter(|n| !n.is_empty()) {
            return name.clone();
        }
        if let Some(name) = self.file_name() {
            return name;
        }
        if let Ok(url) = url::Url::parse(&self.source_url)
            && let Some(segment) = url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
        {
            return segment.to_string();
        }
        "Untitled".to_string()
    }

    /// Progress in percent, if the host knows the total size
    pub fn percent_complete(&self) -> Option<u8> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let percent = (self.current_bytes as f64 / total as f64) * 100.0;
                Some(percent.round().clamp(0.0, 100.0) as u8)
            }
            _ => None,
        }
    }

    /// Best guess at the final size of a finished download
    pub fn final_size(&self) -> u64 {
        if self.current_bytes > 0 {
            self.current_bytes
        } else {
            self.total_bytes.unwrap_or(0)
        }
    }
}
