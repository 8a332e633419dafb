use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::traits::{DownloadHost, FileSystem, HostEvent};
use crate::models::{DownloadRecord, DownloadState};
use crate::utils::{FsError, HostError, extension_of, guess_content_type};

/// Filesystem collaborator backed by the local disk
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn size(&self, path: &Path) -> Result<u64, FsError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(metadata.len())
    }

    async fn read_bytes(&self, path: &Path, max_bytes: u64) -> Result<Vec<u8>, FsError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        let mut buffer = Vec::new();
        file.take(max_bytes).read_to_end(&mut buffer).await?;
        Ok(buffer)
    }

    async fn rename(&self, path: &Path, new_simple_name: &str) -> Result<PathBuf, FsError> {
        if new_simple_name.is_empty() || new_simple_name.contains(std::path::is_separator) {
            return Err(FsError::InvalidName(new_simple_name.to_string()));
        }
        if !self.exists(path).await {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        let new_path = path
            .parent()
            .map(|dir| dir.join(new_simple_name))
            .unwrap_or_else(|| PathBuf::from(new_simple_name));

        tokio::fs::rename(path, &new_path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        debug!("Renamed {:?} -> {:?}", path, new_path);
        Ok(new_path)
    }
}

/// A downloads folder exposed as a download host.
///
/// Every regular file is reported as a finished download. Erasing only hides
/// the file from later listings; the file itself stays on disk.
#[derive(Debug)]
pub struct DirectoryHost {
    directory: PathBuf,
    erased: Mutex<HashSet<PathBuf>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<HostEvent>>>,
}

impl DirectoryHost {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            erased: Mutex::new(HashSet::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn notify(&self, event: HostEvent) {
        self.subscribers
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    fn record_for(path: &Path, metadata: &std::fs::Metadata) -> DownloadRecord {
        let started_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let source_url = url::Url::from_file_path(path)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned());

        let mut record = DownloadRecord::new(source_url, started_at)
            .with_path(path)
            .with_progress(metadata.len(), Some(metadata.len()))
            .with_state(DownloadState::Succeeded);

        if let Some(name) = path.file_name() {
            record = record.with_host_id(name.to_string_lossy().into_owned());
        }

        let content_type = path
            .file_name()
            .and_then(|name| extension_of(&name.to_string_lossy()))
            .and_then(|ext| guess_content_type(&ext));
        if let Some(content_type) = content_type {
            record = record.with_content_type(content_type);
        }

        record
    }
}

#[async_trait]
impl DownloadHost for DirectoryHost {
    async fn list_all(&self) -> Result<Vec<DownloadRecord>, HostError> {
        let mut entries = tokio::fs::read_dir(&self.directory).await.map_err(|e| {
            HostError::Unavailable(format!("{}: {}", self.directory.display(), e))
        })?;

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry in {:?}: {}", self.directory, e);
                    continue;
                }
            };

            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() || self.erased.lock().contains(&path) {
                continue;
            }
            // Hidden and partial files are not finished downloads
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.ends_with(".part") {
                continue;
            }

            records.push(Self::record_for(&path, &metadata));
        }

        records.sort_by_key(|record| record.started_at);
        info!(
            "Found {} finished downloads in {:?}",
            records.len(),
            self.directory
        );
        Ok(records)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<HostEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().push(sender);
        receiver
    }

    async fn cancel(&self, record: &DownloadRecord) -> Result<(), HostError> {
        Err(HostError::Action(format!(
            "{} is already on disk",
            record.display_name()
        )))
    }

    async fn start(&self, record: &DownloadRecord) -> Result<(), HostError> {
        Err(HostError::Action(format!(
            "{} cannot be restarted from a folder",
            record.display_name()
        )))
    }

    async fn erase(&self, record: &DownloadRecord) -> Result<(), HostError> {
        let path = record
            .path
            .clone()
            .ok_or_else(|| HostError::NotFound(record.source_url.clone()))?;
        self.erased.lock().insert(path);
        self.notify(HostEvent::Removed(record.clone()));
        Ok(())
    }

    async fn update_target(
        &self,
        record: &DownloadRecord,
        new_path: &Path,
    ) -> Result<(), HostError> {
        let mut updated = record.clone();
        updated.path = Some(new_path.to_path_buf());
        self.notify(HostEvent::Changed(updated));
        Ok(())
    }

    async fn launch(&self, record: &DownloadRecord) -> Result<(), HostError> {
        let path = record
            .path
            .clone()
            .ok_or_else(|| HostError::NotFound(record.source_url.clone()))?;
        let mut command = opener_command(&path);
        command
            .spawn()
            .map_err(|e| HostError::Action(format!("{}: {}", path.display(), e)))?;
        debug!("Launched {:?}", path);
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn opener_command(path: &Path) -> std::process::Command {
    let mut command = std::process::Command::new("explorer");
    command.arg(path);
    command
}

#[cfg(target_os = "macos")]
fn opener_command(path: &Path) -> std::process::Command {
    let mut command = std::process::Command::new("open");
    command.arg(path);
    command
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn opener_command(path: &Path) -> std::process::Command {
    let mut command = std::process::Command::new("xdg-open");
    command.arg(path);
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_rename_and_missing_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("IMG_0001.jpg");
        tokio::fs::write(&path, b"jpeg").await.unwrap();

        let fs = LocalFileSystem::new();
        assert!(fs.exists(&path).await);
        assert_eq!(fs.size(&path).await.unwrap(), 4);
        assert_eq!(fs.read_bytes(&path, 2).await.unwrap(), b"jp");

        let new_path = fs.rename(&path, "red-sports-car.jpg").await.unwrap();
        assert_eq!(new_path, dir.path().join("red-sports-car.jpg"));
        assert!(!fs.exists(&path).await);

        let err = fs.rename(&path, "again.jpg").await.unwrap_err();
        assert!(matches!(err, FsError::NotFound(_)));
        let err = fs.rename(&new_path, "a/b.jpg").await.unwrap_err();
        assert!(matches!(err, FsError::InvalidName(_)));
    }

    #[tokio::test]
    async fn test_directory_host_lists_and_erases() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"hello").await.unwrap();
        tokio::fs::write(dir.path().join("movie.mkv.part"), b"..").await.unwrap();
        tokio::fs::write(dir.path().join(".hidden"), b"..").await.unwrap();
        tokio::fs::create_dir(dir.path().join("subdir")).await.unwrap();

        let host = DirectoryHost::new(dir.path());
        let records = host.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_name(), "notes.txt");
        assert_eq!(records[0].content_type.as_deref(), Some("text/plain"));
        assert_eq!(records[0].state, DownloadState::Succeeded);

        let mut events = host.subscribe();
        host.erase(&records[0]).await.unwrap();
        assert!(host.list_all().await.unwrap().is_empty());
        assert!(matches!(events.recv().await, Some(HostEvent::Removed(_))));
    }

    #[tokio::test]
    async fn test_launch_needs_a_path() {
        let host = DirectoryHost::new("/tmp");
        let record = DownloadRecord::new("https://example.com/a.zip", Utc::now());
        assert!(matches!(
            host.launch(&record).await,
            Err(HostError::NotFound(_))
        ));

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        assert_eq!(
            opener_command(Path::new("/tmp/a.zip")).get_program(),
            "xdg-open"
        );
    }

    #[tokio::test]
    async fn test_directory_host_unavailable() {
        let host = DirectoryHost::new("/definitely/not/a/real/dir");
        assert!(matches!(
            host.list_all().await,
            Err(HostError::Unavailable(_))
        ));
    }
}
