use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;

use super::{DownloadRecord, DownloadState, PodKey, Preview};

/// Lifecycle of a pod, derived from host events and user actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    Created,
    Downloading,
    Completed,
    Errored,
    Canceled,
    /// Canceled from the pod itself rather than by the host
    UserCanceled,
    PermanentlyDeleted,
}

impl LifecyclePhase {
    /// Next phase after the host reported `state`.
    ///
    /// A user cancel is sticky against the host echoing "canceled", and a
    /// permanently deleted pod never comes back to life.
    pub fn advance(self, state: DownloadState) -> Self {
        match (self, state) {
            (Self::PermanentlyDeleted, _) => self,
            (Self::UserCanceled, DownloadState::Canceled) => self,
            (_, DownloadState::Downloading) => Self::Downloading,
            (_, DownloadState::Succeeded) => Self::Completed,
            (_, DownloadState::Errored) => Self::Errored,
            (_, DownloadState::Canceled) => Self::Canceled,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::UserCanceled)
    }
}

/// Progress of the AI rename for one pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenameStatus {
    #[default]
    Idle,
    Analyzing,
    Renaming,
    Renamed,
    Failed,
}

impl RenameStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Analyzing | Self::Renaming)
    }
}

/// Layout target last applied to a pod.
///
/// `offset_x` is the distance from the stack's anchor edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PodTarget {
    pub offset_x: f32,
    pub opacity: f32,
    pub z_index: i32,
}

impl PodTarget {
    pub fn is_shown(&self) -> bool {
        self.opacity > 0.0
    }
}

/// State of one tracked download
#[derive(Debug, Clone)]
pub struct PodState {
    pub key: PodKey,
    pub record: DownloadRecord,
    pub original_filename: String,
    pub pre_rename_path: Option<PathBuf>,
    pub pre_rename_simple_name: Option<String>,
    pub phase: LifecyclePhase,
    pub rename_status: RenameStatus,
    pub visible: bool,
    pub pending_target: Option<PodTarget>,
    pub last_interaction_at: Instant,
    pub dismissed: bool,
    pub completion_handled: bool,
    /// Adopted from the host's listing and not yet seen in a live event
    pub from_listing: bool,
    pub status_text: String,
    pub progress_text: String,
    pub preview: Preview,
}

impl PodState {
    pub fn new(key: PodKey, record: DownloadRecord, now: Instant) -> Self {
        let original_filename = record.display_name();
        Self {
            key,
            record,
            original_filename,
            pre_rename_path: None,
            pre_rename_simple_name: None,
            phase: LifecyclePhase::Created,
            rename_status: RenameStatus::Idle,
            visible: false,
            pending_target: None,
            last_interaction_at: now,
            dismissed: false,
            completion_handled: false,
            from_listing: false,
            status_text: "Starting download...".to_string(),
            progress_text: "Calculating size...".to_string(),
            preview: Preview::default(),
        }
    }

    /// Undo is possible once a rename went through and the previous name is known
    pub fn can_undo(&self) -> bool {
        self.rename_status == RenameStatus::Renamed
            && self.pre_rename_path.is_some()
            && self.pre_rename_simple_name.is_some()
    }

    pub fn snapshot(&self) -> PodSnapshot {
        PodSnapshot {
            key: self.key.clone(),
            display_name: self.record.display_name(),
            original_filename: self.original_filename.clone(),
            phase: self.phase,
            rename_status: self.rename_status,
            status_text: self.status_text.clone(),
            progress_text: self.progress_text.clone(),
            preview: self.preview.clone(),
            can_undo: self.can_undo(),
            record: self.record.clone(),
        }
    }
}

/// Display state captured when a pod is dismissed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub key: PodKey,
    pub display_name: String,
    pub original_filename: String,
    pub phase: LifecyclePhase,
    pub rename_status: RenameStatus,
    pub status_text: String,
    pub progress_text: String,
    pub preview: Preview,
    pub can_undo: bool,
    pub record: DownloadRecord,
}
