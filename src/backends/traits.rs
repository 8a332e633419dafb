use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::DownloadRecord;
use crate::utils::{FsError, HostError, InferenceError};

/// Change notification from the download host, delivered in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Added(DownloadRecord),
    Changed(DownloadRecord),
    Removed(DownloadRecord),
}

impl HostEvent {
    pub fn record(&self) -> &DownloadRecord {
        match self {
            Self::Added(record) | Self::Changed(record) | Self::Removed(record) => record,
        }
    }
}

/// The download-tracking service of the host application
#[async_trait]
pub trait DownloadHost: Send + Sync + std::fmt::Debug {
    /// Every download the host still knows about
    async fn list_all(&self) -> Result<Vec<DownloadRecord>, HostError>;

    /// Channel of add/change/remove notifications.
    ///
    /// Each call returns a fresh receiver; events published before the call
    /// are not replayed.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<HostEvent>;

    async fn cancel(&self, record: &DownloadRecord) -> Result<(), HostError>;

    /// Resume (or retry) a download
    async fn start(&self, record: &DownloadRecord) -> Result<(), HostError>;

    /// Remove the download from the host's history
    async fn erase(&self, record: &DownloadRecord) -> Result<(), HostError>;

    /// Point the host's record at a renamed file
    async fn update_target(
        &self,
        record: &DownloadRecord,
        new_path: &Path,
    ) -> Result<(), HostError>;

    /// Open a finished download with the system's default handler
    async fn launch(&self, record: &DownloadRecord) -> Result<(), HostError>;
}

/// Filesystem operations used by previews and renaming
#[async_trait]
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    async fn exists(&self, path: &Path) -> bool;

    async fn size(&self, path: &Path) -> Result<u64, FsError>;

    /// Read at most `max_bytes` from the start of the file
    async fn read_bytes(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>, FsError>;

    /// Rename within the same directory, returning the new path.
    /// Fails with `FsError::NotFound` when the source is gone.
    async fn rename(&self, path: &Path, new_simple_name: &str) -> Result<PathBuf, FsError>;
}

/// Inline image attached to an inference request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
}

impl ImagePayload {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub image: Option<ImagePayload>,
}

impl InferenceRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }
}

/// Remote text/vision model
#[async_trait]
pub trait InferenceApi: Send + Sync + std::fmt::Debug {
    /// Generate text for `request`, giving up with `InferenceError::Cancelled`
    /// as soon as `cancel` fires.
    async fn complete(
        &self,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InferenceError>;

    /// Cheap round-trip used at startup to decide whether renaming is usable
    async fn verify(&self) -> Result<(), InferenceError>;
}
