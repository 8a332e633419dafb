use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tidy_downloads::Settings;
use tidy_downloads::models::{DownloadRecord, DownloadState};

pub struct DownloadBuilder {
    host_id: Option<String>,
    path: Option<PathBuf>,
    source_url: String,
    content_type: Option<String>,
    current_bytes: u64,
    total_bytes: Option<u64>,
    state: DownloadState,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
}

impl DownloadBuilder {
    /// An in-progress download to `path`, identified on the host by its file name
    pub fn new(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            source_url: format!("https://example.com/files/{}", name),
            host_id: Some(name),
            path: Some(PathBuf::from(path)),
            content_type: None,
            current_bytes: 0,
            total_bytes: None,
            state: DownloadState::Downloading,
            error_message: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_progress(mut self, current: u64, total: u64) -> Self {
        self.current_bytes = current;
        self.total_bytes = Some(total);
        self
    }

    pub fn started_hours_ago(mut self, hours: i64) -> Self {
        self.started_at = Utc::now() - Duration::hours(hours);
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.state = DownloadState::Succeeded;
        self
    }

    pub fn canceled(mut self) -> Self {
        self.state = DownloadState::Canceled;
        self
    }

    pub fn errored(mut self, message: &str) -> Self {
        self.state = DownloadState::Errored;
        self.error_message = Some(message.to_string());
        self
    }

    pub fn build(self) -> DownloadRecord {
        let mut record = DownloadRecord::new(self.source_url, self.started_at)
            .with_state(self.state);
        record.host_id = self.host_id.map(Into::into);
        record.path = self.path;
        record.content_type = self.content_type;
        record.current_bytes = self.current_bytes;
        record.total_bytes = self.total_bytes;
        record.error_message = self.error_message;
        record
    }
}

/// Defaults with an API key set, so AI renaming is on when an inference
/// API is supplied
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.renaming.api_key = "test-key".to_string();
    settings
}

pub fn settings_without_stable_focus() -> Settings {
    let mut settings = test_settings();
    settings.pods.stable_focus = false;
    settings
}
