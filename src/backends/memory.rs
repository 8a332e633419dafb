use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use super::traits::{DownloadHost, FileSystem, HostEvent};
use crate::models::DownloadRecord;
use crate::utils::{FsError, HostError};

/// Action delegated to the host, recorded for inspection
#[derive(Debug, Clone, PartialEq)]
pub enum HostAction {
    Cancel(DownloadRecord),
    Start(DownloadRecord),
    Erase(DownloadRecord),
    UpdateTarget(DownloadRecord, PathBuf),
    Launch(DownloadRecord),
}

/// In-memory download host; the embedding application pushes records in
#[derive(Debug, Default)]
pub struct MemoryHost {
    records: Mutex<Vec<DownloadRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<HostEvent>>>,
    actions: Mutex<Vec<HostAction>>,
    unavailable: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host whose listing always fails
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_records(records: Vec<DownloadRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    fn same_download(a: &DownloadRecord, b: &DownloadRecord) -> bool {
        match (&a.host_id, &b.host_id) {
            (Some(a_id), Some(b_id)) => a_id == b_id,
            _ => a.path.is_some() && a.path == b.path,
        }
    }

    fn notify(&self, event: HostEvent) {
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Track a new download and announce it
    pub fn add(&self, record: DownloadRecord) {
        self.records.lock().push(record.clone());
        self.notify(HostEvent::Added(record));
    }

    /// Replace a tracked download and announce the change
    pub fn change(&self, record: DownloadRecord) {
        {
            let mut records = self.records.lock();
            match records.iter_mut().find(|r| Self::same_download(r, &record)) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
        }
        self.notify(HostEvent::Changed(record));
    }

    /// Forget a download and announce the removal
    pub fn remove(&self, record: &DownloadRecord) {
        self.records
            .lock()
            .retain(|r| !Self::same_download(r, record));
        self.notify(HostEvent::Removed(record.clone()));
    }

    pub fn records(&self) -> Vec<DownloadRecord> {
        self.records.lock().clone()
    }

    pub fn actions(&self) -> Vec<HostAction> {
        self.actions.lock().clone()
    }
}

#[async_trait]
impl DownloadHost for MemoryHost {
    async fn list_all(&self) -> Result<Vec<DownloadRecord>, HostError> {
        if self.unavailable {
            return Err(HostError::Unavailable("memory host disabled".to_string()));
        }
        Ok(self.records())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<HostEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    async fn cancel(&self, record: &DownloadRecord) -> Result<(), HostError> {
        self.actions.lock().push(HostAction::Cancel(record.clone()));
        Ok(())
    }

    async fn start(&self, record: &DownloadRecord) -> Result<(), HostError> {
        self.actions.lock().push(HostAction::Start(record.clone()));
        Ok(())
    }

    async fn erase(&self, record: &DownloadRecord) -> Result<(), HostError> {
        self.actions.lock().push(HostAction::Erase(record.clone()));
        let known = {
            let mut records = self.records.lock();
            let before = records.len();
            records.retain(|r| !Self::same_download(r, record));
            records.len() != before
        };
        if known {
            Ok(())
        } else {
            Err(HostError::NotFound(record.display_name()))
        }
    }

    async fn update_target(
        &self,
        record: &DownloadRecord,
        new_path: &Path,
    ) -> Result<(), HostError> {
        self.actions
            .lock()
            .push(HostAction::UpdateTarget(record.clone(), new_path.to_path_buf()));

        let mut records = self.records.lock();
        if let Some(existing) = records.iter_mut().find(|r| Self::same_download(r, record)) {
            existing.path = Some(new_path.to_path_buf());
            existing.suggested_name = record.suggested_name.clone();
        }
        Ok(())
    }

    async fn launch(&self, record: &DownloadRecord) -> Result<(), HostError> {
        self.actions.lock().push(HostAction::Launch(record.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    size: u64,
}

/// In-memory filesystem.
///
/// A file's reported size can exceed its stored bytes, so large downloads
/// can be modelled without allocating them.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, MemoryFile>>,
    renames: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let size = data.len() as u64;
        self.files
            .lock()
            .insert(path.into(), MemoryFile { data, size });
    }

    /// A file that reports `size` bytes but stores none
    pub fn add_sized_file(&self, path: impl Into<PathBuf>, size: u64) {
        self.files.lock().insert(
            path.into(),
            MemoryFile {
                data: Vec::new(),
                size,
            },
        );
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.files.lock().remove(path).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    /// Every rename performed, oldest first
    pub fn renames(&self) -> Vec<(PathBuf, PathBuf)> {
        self.renames.lock().clone()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.contains(path)
    }

    async fn size(&self, path: &Path) -> Result<u64, FsError> {
        self.files
            .lock()
            .get(path)
            .map(|file| file.size)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    async fn read_bytes(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>, FsError> {
        let files = self.files.lock();
        let file = files
            .get(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        let len = file.data.len().min(usize::try_from(max_bytes).unwrap_or(usize::MAX));
        Ok(file.data[..len].to_vec())
    }

    async fn rename(&self, path: &Path, new_simple_name: &str) -> Result<PathBuf, FsError> {
        if new_simple_name.is_empty() || new_simple_name.contains(std::path::is_separator) {
            return Err(FsError::InvalidName(new_simple_name.to_string()));
        }

        let mut files = self.files.lock();
        let file = files
            .remove(path)
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;

        let new_path = path
            .parent()
            .map(|dir| dir.join(new_simple_name))
            .unwrap_or_else(|| PathBuf::from(new_simple_name));
        files.insert(new_path.clone(), file);
        self.renames
            .lock()
            .push((path.to_path_buf(), new_path.clone()));

        debug!("Renamed {:?} -> {:?} (memory)", path, new_path);
        Ok(new_path)
    }
}
