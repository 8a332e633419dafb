use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::naming::{
    collision_candidate, fallback_name, finalize_name, is_improvement, sanitize_suggestion,
};
use super::prompts::{image_prompt, metadata_prompt};
use crate::backends::{FileSystem, ImagePayload, InferenceApi, InferenceRequest};
use crate::config::RenamingSettings;
use crate::constants::MAX_COLLISION_ATTEMPTS;
use crate::models::PodKey;
use crate::utils::{FsError, InferenceError, extension_of, format_bytes, image_mime_type, is_image_extension};

/// Step the pipeline is working on, reported as it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameStage {
    CheckingSize,
    AnalyzingImage,
    GeneratingName,
    Renaming { new_name: String },
}

impl RenameStage {
    pub fn status_text(&self) -> String {
        match self {
            Self::CheckingSize => "Analyzing file...".to_string(),
            Self::AnalyzingImage => "Analyzing image...".to_string(),
            Self::GeneratingName => "Generating better name...".to_string(),
            Self::Renaming { new_name } => format!("Renaming to: {}", new_name),
        }
    }
}

/// Why a rename did not happen
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenameFailure {
    #[error("File was already processed or is being renamed")]
    AlreadyProcessed,

    #[error("File too large for analysis ({} > {})", format_bytes(*size), format_bytes(*limit))]
    TooLarge { size: u64, limit: u64 },

    #[error("No name suggestion received")]
    NoSuggestion,

    #[error("Suggested name is no improvement")]
    NoImprovement,

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Every candidate name is taken")]
    NamesExhausted,
}

impl RenameFailure {
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "File too large for AI analysis",
            Self::NoSuggestion | Self::NoImprovement | Self::AlreadyProcessed => {
                "Could not generate a better name"
            }
            Self::FileSystem(_) | Self::NamesExhausted => "Rename failed",
        }
    }
}

impl From<FsError> for RenameFailure {
    fn from(error: FsError) -> Self {
        Self::FileSystem(error.to_string())
    }
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed {
        old_path: PathBuf,
        new_path: PathBuf,
        new_name: String,
    },
    Failed(RenameFailure),
    /// The inference API asked us to slow down; the file stays eligible
    RateLimited,
    /// Cancelled through the run's token
    Aborted,
}

impl RenameOutcome {
    /// Status line for the pod, `None` when the pod should keep its status
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            Self::Renamed { .. } => Some("Download renamed to:"),
            Self::Failed(failure) => Some(failure.status_text()),
            Self::RateLimited => Some("API rate limit reached"),
            Self::Aborted => None,
        }
    }
}

/// Input of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest {
    pub key: PodKey,
    pub path: PathBuf,
    /// Name the download had when it was first seen
    pub original_name: String,
    pub source_url: String,
}

#[derive(Debug, Default)]
struct PipelineState {
    processed: HashSet<PathBuf>,
    active: HashMap<PodKey, ActiveRun>,
    next_run_id: u64,
}

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    token: CancellationToken,
}

/// Claim on a key and a path for the duration of one run.
///
/// Dropping it releases the key, and the processed marker too unless the
/// run committed a rename.
#[derive(Debug)]
pub struct RenameTicket {
    request: RenameRequest,
    token: CancellationToken,
    run_id: u64,
    committed: bool,
    state: Arc<Mutex<PipelineState>>,
}

impl RenameTicket {
    pub fn request(&self) -> &RenameRequest {
        &self.request
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn commit(&mut self, new_path: &Path) {
        let mut state = self.state.lock();
        state.processed.insert(self.request.path.clone());
        state.processed.insert(new_path.to_path_buf());
        self.committed = true;
    }
}

impl Drop for RenameTicket {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(key) = state
            .active
            .iter()
            .find(|(_, run)| run.id == self.run_id)
            .map(|(key, _)| key.clone())
        {
            state.active.remove(&key);
        }
        if !self.committed {
            state.processed.remove(&self.request.path);
        }
    }
}

/// AI rename of finished downloads.
///
/// At most one run per key; a path that was renamed stays processed until
/// the rename is undone.
#[derive(Debug, Clone)]
pub struct RenamePipeline {
    fs: Arc<dyn FileSystem>,
    inference: Arc<dyn InferenceApi>,
    settings: Arc<RenamingSettings>,
    state: Arc<Mutex<PipelineState>>,
}

enum Attempt {
    Usable(String),
    Unusable,
    ApiError,
}

impl RenamePipeline {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        inference: Arc<dyn InferenceApi>,
        settings: RenamingSettings,
    ) -> Self {
        Self {
            fs,
            inference,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(PipelineState::default())),
        }
    }

    pub fn settings(&self) -> &RenamingSettings {
        &self.settings
    }

    /// Check the inference API is reachable and the key accepted
    pub async fn verify(&self) -> Result<(), InferenceError> {
        self.inference.verify().await
    }

    /// Claim `request.key` and `request.path`, registering a fresh token.
    pub fn begin(&self, request: RenameRequest) -> Result<RenameTicket, RenameFailure> {
        let mut state = self.state.lock();

        if state.processed.contains(&request.path) {
            debug!("{:?} already processed", request.path);
            return Err(RenameFailure::AlreadyProcessed);
        }
        if state.active.contains_key(&request.key) {
            debug!("Rename already running for {}", request.key);
            return Err(RenameFailure::AlreadyProcessed);
        }

        state.next_run_id += 1;
        let run_id = state.next_run_id;
        let token = CancellationToken::new();
        state.processed.insert(request.path.clone());
        state.active.insert(
            request.key.clone(),
            ActiveRun {
                id: run_id,
                token: token.clone(),
            },
        );

        Ok(RenameTicket {
            request,
            token,
            run_id,
            committed: false,
            state: self.state.clone(),
        })
    }

    /// `begin` and `execute` in one go
    pub async fn run(
        &self,
        request: RenameRequest,
        progress: &(dyn Fn(RenameStage) + Send + Sync),
    ) -> RenameOutcome {
        match self.begin(request) {
            Ok(ticket) => self.execute(ticket, progress).await,
            Err(failure) => RenameOutcome::Failed(failure),
        }
    }

    /// Drive a claimed run to its outcome. The ticket is released on return.
    pub async fn execute(
        &self,
        mut ticket: RenameTicket,
        progress: &(dyn Fn(RenameStage) + Send + Sync),
    ) -> RenameOutcome {
        let outcome = self.execute_inner(&mut ticket, progress).await;
        match &outcome {
            RenameOutcome::Renamed { new_path, .. } => {
                info!("Renamed {:?} -> {:?}", ticket.request.path, new_path)
            }
            RenameOutcome::Aborted => debug!("Rename of {} aborted", ticket.request.key),
            other => debug!("Rename of {} ended: {:?}", ticket.request.key, other),
        }
        outcome
    }

    async fn execute_inner(
        &self,
        ticket: &mut RenameTicket,
        progress: &(dyn Fn(RenameStage) + Send + Sync),
    ) -> RenameOutcome {
        let token = ticket.token.clone();
        let request = ticket.request.clone();
        let path = request.path.as_path();

        if token.is_cancelled() {
            return RenameOutcome::Aborted;
        }
        progress(RenameStage::CheckingSize);

        let size = match self.fs.size(path).await {
            Ok(size) => size,
            Err(e) => return RenameOutcome::Failed(e.into()),
        };
        if token.is_cancelled() {
            return RenameOutcome::Aborted;
        }
        if size > self.settings.max_file_size {
            info!(
                "Skipping rename, file too large: {}",
                format_bytes(size)
            );
            return RenameOutcome::Failed(RenameFailure::TooLarge {
                size,
                limit: self.settings.max_file_size,
            });
        }

        let current_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = extension_of(&current_name);
        let dotted_ext = ext.as_deref().map(|e| format!(".{}", e)).unwrap_or_default();
        let is_image = ext.as_deref().is_some_and(is_image_extension);
        let max_len = self.settings.max_filename_length;

        debug!(
            "Processing {} ({})",
            current_name,
            if is_image { "image" } else { "non-image" }
        );

        let mut api_failed = false;
        let mut got_reply = false;
        let mut candidate = None;

        if is_image {
            if token.is_cancelled() {
                return RenameOutcome::Aborted;
            }
            progress(RenameStage::AnalyzingImage);

            match self.fs.read_bytes(path, self.settings.max_file_size).await {
                Ok(bytes) => {
                    let image = ImagePayload {
                        mime_type: image_mime_type(ext.as_deref().unwrap_or_default()).to_string(),
                        base64_data: BASE64.encode(&bytes),
                    };
                    let request = InferenceRequest::text(image_prompt(&dotted_ext, max_len))
                        .with_image(image);
                    match self.ask(request, &token, &dotted_ext, &current_name).await {
                        Ok(Attempt::Usable(name)) => candidate = Some(name),
                        Ok(Attempt::Unusable) => got_reply = true,
                        Ok(Attempt::ApiError) => api_failed = true,
                        Err(outcome) => return outcome,
                    }
                }
                Err(e) => warn!("Failed to read image {:?}: {}", path, e),
            }
        }

        if candidate.is_none() {
            if token.is_cancelled() {
                return RenameOutcome::Aborted;
            }
            progress(RenameStage::GeneratingName);

            let prompt = metadata_prompt(
                is_image,
                &current_name,
                &request.source_url,
                &dotted_ext,
                max_len,
            );
            match self
                .ask(InferenceRequest::text(prompt), &token, &dotted_ext, &current_name)
                .await
            {
                Ok(Attempt::Usable(name)) => candidate = Some(name),
                Ok(Attempt::Unusable) => got_reply = true,
                Ok(Attempt::ApiError) => api_failed = true,
                Err(outcome) => return outcome,
            }
        }

        if candidate.is_none() && api_failed && self.settings.fallback_enabled {
            let base = if request.original_name.is_empty() {
                &current_name
            } else {
                &request.original_name
            };
            let name = fallback_name(base, &dotted_ext, Utc::now(), max_len);
            if is_improvement(&name, &current_name) {
                debug!("Using fallback name {}", name);
                candidate = Some(name);
            }
        }

        let Some(candidate) = candidate else {
            return RenameOutcome::Failed(if got_reply {
                RenameFailure::NoImprovement
            } else {
                RenameFailure::NoSuggestion
            });
        };

        if token.is_cancelled() {
            return RenameOutcome::Aborted;
        }
        progress(RenameStage::Renaming {
            new_name: candidate.clone(),
        });

        let final_name = finalize_name(&candidate, &dotted_ext);
        let Some(chosen) = self.free_name(path, &final_name, &token).await else {
            if token.is_cancelled() {
                return RenameOutcome::Aborted;
            }
            return RenameOutcome::Failed(RenameFailure::NamesExhausted);
        };

        if token.is_cancelled() {
            return RenameOutcome::Aborted;
        }

        match self.fs.rename(path, &chosen).await {
            Ok(new_path) => {
                ticket.commit(&new_path);
                RenameOutcome::Renamed {
                    old_path: path.to_path_buf(),
                    new_path,
                    new_name: chosen,
                }
            }
            Err(e) => {
                warn!("Rename of {:?} failed: {}", path, e);
                RenameOutcome::Failed(e.into())
            }
        }
    }

    /// One inference round-trip, sanitized and checked.
    /// `Err` carries an outcome that ends the run.
    async fn ask(
        &self,
        request: InferenceRequest,
        token: &CancellationToken,
        dotted_ext: &str,
        current_name: &str,
    ) -> Result<Attempt, RenameOutcome> {
        match self.inference.complete(request, token).await {
            Ok(reply) => {
                let name =
                    sanitize_suggestion(&reply, dotted_ext, self.settings.max_filename_length);
                if is_improvement(&name, current_name) {
                    Ok(Attempt::Usable(name))
                } else {
                    debug!("Rejected suggestion {:?} for {}", name, current_name);
                    Ok(Attempt::Unusable)
                }
            }
            Err(InferenceError::RateLimited { .. }) => Err(RenameOutcome::RateLimited),
            Err(InferenceError::Cancelled) => Err(RenameOutcome::Aborted),
            Err(e) => {
                warn!("Inference failed: {}", e);
                Ok(Attempt::ApiError)
            }
        }
    }

    /// First of `name`, `name-1`, .. `name-99` not present next to `path`.
    ///
    /// Check-then-move: a file created between this check and the rename
    /// is not detected.
    async fn free_name(
        &self,
        path: &Path,
        name: &str,
        token: &CancellationToken,
    ) -> Option<String> {
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        for attempt in 0..=MAX_COLLISION_ATTEMPTS {
            if token.is_cancelled() {
                return None;
            }
            let candidate = if attempt == 0 {
                name.to_string()
            } else {
                collision_candidate(name, attempt)
            };
            if !self.fs.exists(&dir.join(&candidate)).await {
                return Some(candidate);
            }
        }

        warn!("No free name for {} after {} attempts", name, MAX_COLLISION_ATTEMPTS);
        None
    }

    /// Move a renamed file back to `previous_name`, releasing both paths so
    /// a later attempt is possible.
    pub async fn undo(&self, current_path: &Path, previous_name: &str) -> Result<PathBuf, FsError> {
        let restored = self.fs.rename(current_path, previous_name).await?;

        let mut state = self.state.lock();
        state.processed.remove(current_path);
        state.processed.remove(&restored);
        info!("Undid rename {:?} -> {:?}", current_path, restored);
        Ok(restored)
    }

    /// Cancel the active run for `key`, if any
    pub fn cancel(&self, key: &PodKey) -> bool {
        match self.state.lock().active.get(key) {
            Some(run) => {
                run.token.cancel();
                debug!("Cancelled rename for {}", key);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &PodKey) -> bool {
        self.state.lock().active.contains_key(key)
    }

    pub fn is_processed(&self, path: &Path) -> bool {
        self.state.lock().processed.contains(path)
    }

    /// Follow a pod to its new key
    pub fn rekey(&self, old: &PodKey, new: &PodKey) {
        let mut state = self.state.lock();
        if let Some(run) = state.active.remove(old) {
            state.active.insert(new.clone(), run);
        }
    }

    /// Forget a path, e.g. when a download restarts at the same location
    pub fn release_path(&self, path: &Path) {
        self.state.lock().processed.remove(path);
    }
}
