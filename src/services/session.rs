use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::autohide::{AutohideFired, AutohideScheduler};
use super::focus::{Direction, FocusController};
use super::identity::IdentityResolver;
use super::layout::{
    DetailPanel, LayoutFrame, LayoutGeometry, compute_placements, exit_animation, plan_animations,
};
use super::preview::PreviewResolver;
use super::registry::{PodRegistry, UpdateOrigin};
use super::rename::{RenameOutcome, RenamePipeline, RenameRequest, RenameStage};
use super::throttle::UpdateThrottle;
use crate::backends::{DownloadHost, FileSystem, HostEvent, InferenceApi};
use crate::config::Settings;
use crate::constants::DETAIL_FADE_MS;
use crate::events::{EventBus, EventSource, EventType};
use crate::models::{
    DownloadRecord, DownloadState, LifecyclePhase, PodKey, PodSnapshot, PodState, PodTarget,
    RenameStatus,
};
use crate::utils::{HostError, format_bytes};

/// Everything the session reacts to, delivered one at a time
#[derive(Debug)]
pub enum SessionInput {
    Host(HostEvent),
    Rotate(Direction),
    Focus(PodKey),
    Close(PodKey),
    Undo(PodKey),
    CancelDownload(PodKey),
    Resume(PodKey),
    Open(PodKey),
    Interact(PodKey),
    Resize(f32),
    Restore {
        key: PodKey,
        reply: oneshot::Sender<bool>,
    },
    DeletePermanently {
        key: PodKey,
        reply: oneshot::Sender<Result<(), HostError>>,
    },
    ListDismissed(oneshot::Sender<Vec<PodSnapshot>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    StartRename(PodKey),
    RenameProgress {
        key: PodKey,
        stage: RenameStage,
    },
    RenameFinished {
        key: PodKey,
        outcome: RenameOutcome,
    },
    AutohideFired(AutohideFired),
    /// The detail fade armed by the `generation`-th close has finished
    DetailClosed {
        generation: u64,
    },
    Shutdown,
}

impl From<AutohideFired> for SessionInput {
    fn from(fired: AutohideFired) -> Self {
        Self::AutohideFired(fired)
    }
}

/// Read-only copy of the session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub order: Vec<PodKey>,
    pub focused: Option<PodKey>,
    /// Live pods, in `order`
    pub pods: Vec<PodSnapshot>,
    pub detail: DetailPanel,
    pub dismissed: Vec<PodKey>,
    pub autohide_scheduled: Vec<PodKey>,
    pub active_renames: Vec<PodKey>,
    pub ai_enabled: bool,
}

impl SessionSnapshot {
    pub fn pod(&self, key: &PodKey) -> Option<&PodSnapshot> {
        self.pods.iter().find(|pod| &pod.key == key)
    }
}

/// The single owner of all pod state.
///
/// Handlers run one at a time from the session worker; timers and pipeline
/// runs report back through `sender` instead of touching state themselves.
pub struct Session {
    settings: Settings,
    host: Arc<dyn DownloadHost>,
    fs: Arc<dyn FileSystem>,
    bus: Arc<EventBus>,
    registry: PodRegistry,
    focus: FocusController,
    geometry: LayoutGeometry,
    throttle: UpdateThrottle,
    autohide: AutohideScheduler<SessionInput>,
    previews: PreviewResolver,
    pipeline: Option<RenamePipeline>,
    ai_enabled: bool,
    /// Dismissed pods, oldest dismissal first
    dismissed: Vec<PodSnapshot>,
    detail: DetailPanel,
    close_generation: u64,
    sender: mpsc::UnboundedSender<SessionInput>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pods", &self.registry.len())
            .field("focused", &self.focus.focused())
            .field("dismissed", &self.dismissed.len())
            .field("ai_enabled", &self.ai_enabled)
            .finish()
    }
}

impl Session {
    pub fn new(
        settings: Settings,
        host: Arc<dyn DownloadHost>,
        fs: Arc<dyn FileSystem>,
        inference: Option<Arc<dyn InferenceApi>>,
        bus: Arc<EventBus>,
        sender: mpsc::UnboundedSender<SessionInput>,
    ) -> Self {
        let pipeline = inference
            .filter(|_| settings.renaming.enabled)
            .map(|api| RenamePipeline::new(fs.clone(), api, settings.renaming.clone()));
        let ai_enabled = pipeline.is_some();
        if !ai_enabled {
            info!("AI renaming not configured");
        }

        Self {
            geometry: LayoutGeometry::from_settings(&settings.layout),
            throttle: UpdateThrottle::new(settings.progress_throttle()),
            autohide: AutohideScheduler::new(
                settings.autohide_delay(),
                settings.pods.autohide_disabled,
                sender.clone(),
            ),
            previews: PreviewResolver::new(fs.clone()),
            registry: PodRegistry::new(),
            focus: FocusController::new(),
            pipeline,
            ai_enabled,
            dismissed: Vec::new(),
            detail: DetailPanel::Hidden,
            close_generation: 0,
            settings,
            host,
            fs,
            bus,
            sender,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    /// Rebuild the registry from the host's download list.
    ///
    /// Finished downloads older than the re-show window are skipped, and
    /// none of the restored pods is renamed automatically.
    pub async fn startup(&mut self) {
        let records = match self.host.list_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Download host unavailable at startup: {}", e);
                self.disable_ai(format!("Download host unavailable: {}", e))
                    .await;
                return;
            }
        };

        let cutoff = Utc::now() - self.settings.reshow_window();
        let mut records: Vec<DownloadRecord> = records
            .into_iter()
            .filter(|record| !record.state.is_terminal() || record.started_at >= cutoff)
            .collect();
        records.sort_by_key(|record| record.started_at);
        info!("Restoring {} downloads from host", records.len());

        for record in records {
            self.adopt(record, EventType::PodCreated).await;
        }
        self.relayout(Vec::new()).await;

        if let Some(pipeline) = self.pipeline.clone().filter(|_| self.ai_enabled)
            && let Err(e) = pipeline.verify().await
        {
            warn!("Inference API check failed: {}", e);
            self.disable_ai(format!("AI renaming disabled: {}", e)).await;
        }
    }

    /// Process one input. Returns `false` once the session should stop.
    pub async fn handle(&mut self, input: SessionInput) -> bool {
        match input {
            SessionInput::Host(event) => self.on_host_event(event).await,
            SessionInput::Rotate(direction) => self.rotate(direction).await,
            SessionInput::Focus(key) => self.focus_pod(&key).await,
            SessionInput::Close(key) => self.dismiss(&key, EventSource::User).await,
            SessionInput::Undo(key) => self.undo(&key).await,
            SessionInput::CancelDownload(key) => self.cancel_download(&key).await,
            SessionInput::Resume(key) => self.resume(&key).await,
            SessionInput::Open(key) => self.open(&key).await,
            SessionInput::Interact(key) => self.touch(&key),
            SessionInput::Resize(width) => {
                self.geometry.container_width = width.max(0.0);
                self.relayout(Vec::new()).await;
            }
            SessionInput::Restore { key, reply } => {
                let restored = self.restore(&key).await;
                let _ = reply.send(restored);
            }
            SessionInput::DeletePermanently { key, reply } => {
                let result = self.delete_permanently(&key).await;
                let _ = reply.send(result);
            }
            SessionInput::ListDismissed(reply) => {
                let _ = reply.send(self.dismissed.clone());
            }
            SessionInput::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionInput::StartRename(key) => self.start_rename(&key).await,
            SessionInput::RenameProgress { key, stage } => {
                self.on_rename_progress(&key, stage).await
            }
            SessionInput::RenameFinished { key, outcome } => {
                self.on_rename_finished(&key, outcome).await
            }
            SessionInput::AutohideFired(fired) => self.on_autohide(fired).await,
            SessionInput::DetailClosed { generation } => self.on_detail_closed(generation).await,
            SessionInput::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Stop every timer and cancel every rename in flight
    pub fn shutdown(&mut self) {
        self.autohide.cancel_all();
        if let Some(pipeline) = &self.pipeline {
            for key in self.registry.keys() {
                pipeline.cancel(key);
            }
        }
        debug!("Session shut down");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let pipeline = self.pipeline.as_ref();
        SessionSnapshot {
            order: self.focus.order().to_vec(),
            focused: self.focus.focused().cloned(),
            pods: self
                .focus
                .order()
                .iter()
                .filter_map(|key| self.registry.get(key))
                .map(PodState::snapshot)
                .collect(),
            detail: self.detail.clone(),
            dismissed: self.dismissed.iter().map(|pod| pod.key.clone()).collect(),
            autohide_scheduled: self.autohide.scheduled_keys().cloned().collect(),
            active_renames: self
                .registry
                .keys()
                .filter(|key| pipeline.is_some_and(|p| p.is_active(key)))
                .cloned()
                .collect(),
            ai_enabled: self.ai_enabled,
        }
    }

    async fn on_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Added(record) => self.on_host_record(record, true).await,
            HostEvent::Changed(record) => self.on_host_record(record, false).await,
            HostEvent::Removed(record) => self.on_host_removed(record).await,
        }
    }

    async fn on_host_record(&mut self, record: DownloadRecord, added: bool) {
        let now = Instant::now();
        let resolved = IdentityResolver::resolve(&record);

        if self.is_dismissed(&resolved) {
            if added && record.state == DownloadState::Downloading {
                debug!("New download at dismissed {}, tracking it again", resolved);
                self.dismissed.retain(|pod| pod.key != resolved);
            } else {
                trace!("Ignoring update for dismissed {}", resolved);
                return;
            }
        }

        let previous_phase = self.registry.get(&resolved).map(|pod| pod.phase);
        let restarted = record.state == DownloadState::Downloading
            && previous_phase.is_some_and(|phase| {
                phase.is_canceled() || phase == LifecyclePhase::Errored
            });

        let upserted = self.registry.upsert(record, UpdateOrigin::External, now);
        let key = upserted.key.clone();
        if let Some(old) = &upserted.moved_from {
            self.rekey_dependents(old, &key);
        }
        if restarted {
            debug!("{} restarted after cancel or error", key);
            self.reset_for_restart(&key);
        }

        let Some(pod) = self.registry.get_mut(&key) else {
            return;
        };
        if upserted.created {
            pod.phase = pod.phase.advance(pod.record.state);
        }
        // Finished while startup was reading the listing: still a live completion
        let relisted = std::mem::take(&mut pod.from_listing)
            && added
            && !upserted.created
            && pod.rename_status == RenameStatus::Idle;
        if relisted {
            pod.completion_handled = false;
        }
        refresh_status(pod);
        let state = pod.record.state;
        let phase = pod.phase;
        let completion_pending = state == DownloadState::Succeeded && !pod.completion_handled;
        if relisted && completion_pending {
            self.autohide.cancel(&key);
        }

        if upserted.created {
            self.throttle.admit(&key, state, now);
            self.emit_pod(EventType::PodCreated, &key, EventSource::Host)
                .await;
            if self.place_new_pod(&key, state) {
                self.emit_focus().await;
            }
        } else if self.throttle.admit(&key, state, now) {
            self.emit_pod(EventType::PodUpdated, &key, EventSource::Host)
                .await;
        }

        if completion_pending {
            self.on_completed(&key).await;
        } else if matches!(state, DownloadState::Errored | DownloadState::Canceled)
            && previous_phase != Some(phase)
        {
            self.schedule_autohide(&key);
        }

        if upserted.created || upserted.moved_from.is_some() {
            self.relayout(Vec::new()).await;
        }
    }

    async fn on_host_removed(&mut self, record: DownloadRecord) {
        let mut key = IdentityResolver::resolve(&record);
        if !self.registry.contains(&key)
            && let Some(id) = &record.host_id
            && let Some(found) = self.registry.find_by_host_id(id)
        {
            key = found.clone();
        }

        self.dismissed.retain(|pod| pod.key != key);
        if self.registry.contains(&key) {
            debug!("Host dropped {}", key);
            self.remove_pod(&key, EventSource::Host, false).await;
        }
    }

    /// Append `key` to the order, returning whether it took focus
    fn place_new_pod(&mut self, key: &PodKey, state: DownloadState) -> bool {
        let focused_state = self
            .focus
            .focused()
            .and_then(|focused| self.registry.get(focused))
            .map(|pod| pod.record.state);
        self.focus.on_pod_created(
            key.clone(),
            state,
            focused_state,
            self.settings.pods.stable_focus,
        )
    }

    /// Track a download the host already had, without the completion side
    /// effects a live download gets.
    async fn adopt(&mut self, record: DownloadRecord, event_type: EventType) -> PodKey {
        let now = Instant::now();
        let upserted = self.registry.upsert(record, UpdateOrigin::Silent, now);
        let key = upserted.key;

        let Some(pod) = self.registry.get_mut(&key) else {
            return key;
        };
        pod.completion_handled = pod.record.state == DownloadState::Succeeded;
        pod.from_listing = true;
        pod.phase = pod.phase.advance(pod.record.state);
        pod.last_interaction_at = now;
        refresh_status(pod);
        let record = pod.record.clone();

        if record.state == DownloadState::Succeeded {
            let preview = self.previews.resolve(&record).await;
            if let Some(pod) = self.registry.get_mut(&key) {
                pod.preview = preview;
            }
        }

        self.throttle.admit(&key, record.state, now);
        let focus_moved = self.place_new_pod(&key, record.state);
        self.emit_pod(event_type, &key, EventSource::Host).await;
        if focus_moved {
            self.emit_focus().await;
        }
        if record.state.is_terminal() {
            self.schedule_autohide(&key);
        }
        key
    }

    async fn on_completed(&mut self, key: &PodKey) {
        let Some(pod) = self.registry.get_mut(key) else {
            return;
        };
        pod.completion_handled = true;
        let record = pod.record.clone();
        info!("Download completed: {}", record.display_name());

        let preview = self.previews.resolve(&record).await;
        if let Some(pod) = self.registry.get_mut(key) {
            pod.preview = preview;
        }
        self.emit_pod(EventType::PodStatusChanged, key, EventSource::Host)
            .await;

        if self.rename_eligible(&record) {
            let sender = self.sender.clone();
            let delay = self.settings.rename_start_delay();
            let key = key.clone();
            debug!("Rename of {} starts in {:?}", key, delay);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sender.send(SessionInput::StartRename(key));
            });
        } else {
            self.schedule_autohide(key);
        }
    }

    fn rename_eligible(&self, record: &DownloadRecord) -> bool {
        let Some(pipeline) = self.pipeline.as_ref().filter(|_| self.ai_enabled) else {
            return false;
        };
        record
            .path
            .as_deref()
            .is_some_and(|path| !pipeline.is_processed(path))
    }

    async fn start_rename(&mut self, key: &PodKey) {
        let Some(pipeline) = self.pipeline.clone().filter(|_| self.ai_enabled) else {
            self.schedule_autohide(key);
            return;
        };
        let Some(pod) = self.registry.get(key) else {
            debug!("Not renaming {}: pod gone", key);
            return;
        };
        let Some(path) = pod.record.path.clone() else {
            return;
        };
        if pod.dismissed
            || pod.rename_status != RenameStatus::Idle
            || pod.record.state != DownloadState::Succeeded
        {
            debug!("Not renaming {} ({:?})", key, pod.rename_status);
            return;
        }

        let request = RenameRequest {
            key: key.clone(),
            path: path.clone(),
            original_name: pod.original_filename.clone(),
            source_url: pod.record.source_url.clone(),
        };
        let simple_name = pod.record.file_name();

        let ticket = match pipeline.begin(request) {
            Ok(ticket) => ticket,
            Err(failure) => {
                debug!("Rename of {} not started: {}", key, failure);
                self.schedule_autohide(key);
                return;
            }
        };

        if let Some(pod) = self.registry.get_mut(key) {
            pod.pre_rename_path = Some(path);
            pod.pre_rename_simple_name = simple_name;
            pod.rename_status = RenameStatus::Analyzing;
            pod.status_text = RenameStage::CheckingSize.status_text();
        }
        self.emit_pod(EventType::PodStatusChanged, key, EventSource::Pipeline)
            .await;

        let sender = self.sender.clone();
        let key = key.clone();
        tokio::spawn(async move {
            let progress_sender = sender.clone();
            let progress_key = key.clone();
            let report = move |stage: RenameStage| {
                let _ = progress_sender.send(SessionInput::RenameProgress {
                    key: progress_key.clone(),
                    stage,
                });
            };
            let outcome = pipeline.execute(ticket, &report).await;
            let _ = sender.send(SessionInput::RenameFinished { key, outcome });
        });
    }

    async fn on_rename_progress(&mut self, key: &PodKey, stage: RenameStage) {
        let Some(pod) = self.registry.get_mut(key) else {
            return;
        };
        if !pod.rename_status.is_in_flight() {
            return;
        }
        pod.rename_status = match stage {
            RenameStage::Renaming { .. } => RenameStatus::Renaming,
            _ => RenameStatus::Analyzing,
        };
        pod.status_text = stage.status_text();
        self.emit_pod(EventType::PodStatusChanged, key, EventSource::Pipeline)
            .await;
    }

    async fn on_rename_finished(&mut self, key: &PodKey, outcome: RenameOutcome) {
        let status_text = outcome.status_text();
        let Some(pod) = self.registry.get_mut(key) else {
            self.on_departed_rename(key, outcome).await;
            return;
        };

        match outcome {
            RenameOutcome::Renamed {
                new_path, new_name, ..
            } => {
                let mut before = pod.record.clone();
                before.suggested_name = Some(new_name.clone());

                pod.record.path = Some(new_path.clone());
                pod.record.suggested_name = Some(new_name.clone());
                pod.rename_status = RenameStatus::Renamed;
                if let Some(text) = status_text {
                    pod.status_text = text.to_string();
                }

                let new_key = self.move_pod(key, &IdentityResolver::rekeyed(&new_path));
                self.refresh_preview(&new_key).await;
                if let Err(e) = self.host.update_target(&before, &new_path).await {
                    warn!("Host did not take the new target of {}: {}", new_key, e);
                }
                self.bus
                    .emit_rename(EventType::PodRenamed, key.clone(), new_key.clone(), new_name)
                    .await
                    .ok();
                self.schedule_autohide(&new_key);
            }
            RenameOutcome::Aborted => {
                pod.rename_status = RenameStatus::Idle;
                pod.pre_rename_path = None;
                pod.pre_rename_simple_name = None;
                refresh_status(pod);
                if pod.record.state.is_terminal() && !pod.dismissed {
                    self.schedule_autohide(key);
                }
            }
            RenameOutcome::Failed(_) | RenameOutcome::RateLimited => {
                pod.rename_status = RenameStatus::Failed;
                pod.pre_rename_path = None;
                pod.pre_rename_simple_name = None;
                if let Some(text) = status_text {
                    pod.status_text = text.to_string();
                }
                self.emit_pod(EventType::PodStatusChanged, key, EventSource::Pipeline)
                    .await;
                self.schedule_autohide(key);
            }
        }
    }

    /// The pod left while its rename was finishing. A file that was moved
    /// anyway is followed, so the host and the dismissed list keep a path
    /// that exists.
    async fn on_departed_rename(&mut self, key: &PodKey, outcome: RenameOutcome) {
        let RenameOutcome::Renamed {
            new_path, new_name, ..
        } = outcome
        else {
            debug!("Rename finished for departed pod {}: {:?}", key, outcome);
            return;
        };
        let new_key = IdentityResolver::rekeyed(&new_path);

        let Some(entry) = self.dismissed.iter_mut().find(|pod| &pod.key == key) else {
            warn!(
                "{} was renamed to {} after the host dropped it",
                key, new_name
            );
            return;
        };
        let mut before = entry.record.clone();
        before.suggested_name = Some(new_name.clone());

        entry.key = new_key.clone();
        entry.record.path = Some(new_path.clone());
        entry.record.suggested_name = Some(new_name.clone());
        entry.display_name = new_name.clone();
        entry.rename_status = RenameStatus::Renamed;
        let record = entry.record.clone();

        let preview = self.previews.resolve(&record).await;
        if let Some(entry) = self.dismissed.iter_mut().find(|pod| pod.key == new_key) {
            entry.preview = preview;
        }
        if let Err(e) = self.host.update_target(&before, &new_path).await {
            warn!("Host did not take the new target of {}: {}", new_key, e);
        }
        info!("Dismissed {} renamed to {}", key, new_name);
        self.bus
            .emit_rename(EventType::PodRenamed, key.clone(), new_key, new_name)
            .await
            .ok();
    }

    async fn refresh_preview(&mut self, key: &PodKey) {
        let Some(record) = self.registry.get(key).map(|pod| pod.record.clone()) else {
            return;
        };
        if record.state != DownloadState::Succeeded {
            return;
        }
        let preview = self.previews.resolve(&record).await;
        if let Some(pod) = self.registry.get_mut(key) {
            pod.preview = preview;
        }
    }

    async fn undo(&mut self, key: &PodKey) {
        let Some(pipeline) = self.pipeline.clone() else {
            return;
        };
        let Some(pod) = self.registry.get(key) else {
            return;
        };
        if !pod.can_undo() {
            debug!("Nothing to undo for {}", key);
            return;
        }
        let (Some(current), Some(previous_name)) =
            (pod.record.path.clone(), pod.pre_rename_simple_name.clone())
        else {
            return;
        };
        let mut before = pod.record.clone();
        before.suggested_name = None;

        match pipeline.undo(&current, &previous_name).await {
            Ok(restored) => {
                if let Some(pod) = self.registry.get_mut(key) {
                    pod.record.path = Some(restored.clone());
                    pod.record.suggested_name = None;
                    pod.rename_status = RenameStatus::Idle;
                    pod.pre_rename_path = None;
                    pod.pre_rename_simple_name = None;
                    pod.status_text = "Rename undone".to_string();
                    pod.last_interaction_at = Instant::now();
                }

                let new_key = self.move_pod(key, &IdentityResolver::rekeyed(&restored));
                self.refresh_preview(&new_key).await;
                if let Err(e) = self.host.update_target(&before, &restored).await {
                    warn!("Host did not take the restored target of {}: {}", new_key, e);
                }
                self.bus
                    .emit_rename(
                        EventType::PodRenameUndone,
                        key.clone(),
                        new_key,
                        previous_name,
                    )
                    .await
                    .ok();
            }
            Err(e) => {
                warn!("Undo of {} failed: {}", key, e);
                if let Some(pod) = self.registry.get_mut(key) {
                    pod.status_text = "Undo failed".to_string();
                }
                self.emit_pod(EventType::PodStatusChanged, key, EventSource::User)
                    .await;
            }
        }
    }

    /// Move a pod to `new` along with everything keyed on it.
    /// Returns the key the pod ends up under.
    fn move_pod(&mut self, old: &PodKey, new: &PodKey) -> PodKey {
        match self.registry.rekey(old, new) {
            Ok(()) => {
                self.rekey_dependents(old, new);
                new.clone()
            }
            Err(e) => {
                warn!("Keeping {} under its old key: {}", old, e);
                old.clone()
            }
        }
    }

    fn rekey_dependents(&mut self, old: &PodKey, new: &PodKey) {
        if old == new {
            return;
        }
        self.focus.on_rename(old, new);
        self.throttle.rekey(old, new);
        self.autohide.rekey(old, new);
        if let Some(pipeline) = &self.pipeline {
            pipeline.rekey(old, new);
        }
        self.detail = match std::mem::take(&mut self.detail) {
            DetailPanel::Shown(key) if &key == old => DetailPanel::Shown(new.clone()),
            DetailPanel::Closing(key) if &key == old => DetailPanel::Closing(new.clone()),
            other => other,
        };
    }

    /// Drop everything tied to an earlier attempt of a download that is
    /// running again at the same location
    fn reset_for_restart(&mut self, key: &PodKey) {
        self.autohide.cancel(key);
        let Some(pod) = self.registry.get_mut(key) else {
            return;
        };
        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel(key);
            if let Some(path) = pod.record.path.as_deref() {
                pipeline.release_path(path);
            }
        }
        pod.completion_handled = false;
        pod.rename_status = RenameStatus::Idle;
        pod.pre_rename_path = None;
        pod.pre_rename_simple_name = None;
        refresh_status(pod);
    }

    async fn cancel_download(&mut self, key: &PodKey) {
        let Some(pod) = self.registry.get_mut(key) else {
            return;
        };
        pod.phase = LifecyclePhase::UserCanceled;
        pod.last_interaction_at = Instant::now();
        pod.status_text = "Download canceled".to_string();
        let record = pod.record.clone();

        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel(key);
        }
        if let Err(e) = self.host.cancel(&record).await {
            warn!("Host failed to cancel {}: {}", key, e);
        }
        self.emit_pod(EventType::PodStatusChanged, key, EventSource::User)
            .await;
        self.schedule_autohide(key);
    }

    async fn resume(&mut self, key: &PodKey) {
        let Some(pod) = self.registry.get(key) else {
            return;
        };
        if !(pod.phase.is_canceled() || pod.phase == LifecyclePhase::Errored) {
            debug!("{} is not resumable ({:?})", key, pod.phase);
            return;
        }
        let record = pod.record.clone();

        match self.host.start(&record).await {
            Ok(()) => {
                self.reset_for_restart(key);
                if let Some(pod) = self.registry.get_mut(key) {
                    pod.last_interaction_at = Instant::now();
                    pod.status_text = "Resuming download...".to_string();
                }
                self.emit_pod(EventType::PodStatusChanged, key, EventSource::User)
                    .await;
            }
            Err(e) => warn!("Host failed to resume {}: {}", key, e),
        }
    }

    /// Hand a finished download to the system's default handler
    async fn open(&mut self, key: &PodKey) {
        let Some(pod) = self.registry.get_mut(key) else {
            return;
        };
        pod.last_interaction_at = Instant::now();
        let record = pod.record.clone();
        let Some(path) = record
            .path
            .clone()
            .filter(|_| record.state == DownloadState::Succeeded)
        else {
            debug!("{} has no finished file to open", key);
            return;
        };

        if !self.fs.exists(&path).await {
            warn!("Cannot open {:?}: file does not exist", path);
            return;
        }
        if let Err(e) = self.fs.read_bytes(&path, 1).await {
            warn!("Cannot open {:?}: {}", path, e);
            return;
        }
        match self.host.launch(&record).await {
            Ok(()) => info!("Opened {}", record.display_name()),
            Err(e) => warn!("Host failed to open {}: {}", key, e),
        }
    }

    fn touch(&mut self, key: &PodKey) {
        if let Some(pod) = self.registry.get_mut(key) {
            pod.last_interaction_at = Instant::now();
        }
    }

    async fn rotate(&mut self, direction: Direction) {
        let Some(focused) = self.focus.rotate(direction) else {
            trace!("Nothing to rotate to");
            return;
        };
        self.touch(&focused);
        self.relayout(Vec::new()).await;
        self.emit_focus().await;
    }

    async fn focus_pod(&mut self, key: &PodKey) {
        if self.focus.focus(key) {
            self.touch(key);
            self.relayout(Vec::new()).await;
            self.emit_focus().await;
        }
    }

    async fn on_autohide(&mut self, fired: AutohideFired) {
        if !self.autohide.take_fired(&fired) {
            return;
        }
        let key = fired.key;
        let Some(pod) = self.registry.get(&key) else {
            return;
        };

        let idle = Instant::now().saturating_duration_since(pod.last_interaction_at);
        let grace = self.settings.interaction_grace();
        if idle < grace {
            let remaining = grace - idle;
            debug!("{} touched recently, autohide again in {:?}", key, remaining);
            self.autohide.schedule_in(&key, remaining);
            return;
        }

        self.dismiss(&key, EventSource::Autohide).await;
    }

    /// Remove a pod from view. A focused pod fades its detail panel out
    /// first and goes once that has finished.
    async fn dismiss(&mut self, key: &PodKey, source: EventSource) {
        if !self.registry.contains(key) {
            return;
        }
        self.autohide.cancel(key);
        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel(key);
        }

        if self.detail == DetailPanel::Shown(key.clone()) {
            if let Some(pod) = self.registry.get_mut(key) {
                pod.dismissed = true;
            }
            self.detail = DetailPanel::Closing(key.clone());
            self.close_generation += 1;
            self.relayout(Vec::new()).await;

            let sender = self.sender.clone();
            let generation = self.close_generation;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(DETAIL_FADE_MS)).await;
                let _ = sender.send(SessionInput::DetailClosed { generation });
            });
        } else {
            self.remove_pod(key, source, true).await;
        }
    }

    /// Finish a close once its fade is over. The closing pod is looked up
    /// when the fade ends, so a rename during the fade is followed.
    async fn on_detail_closed(&mut self, generation: u64) {
        let DetailPanel::Closing(key) = &self.detail else {
            trace!("Detail panel no longer closing");
            return;
        };
        if generation != self.close_generation {
            trace!("Stale detail close for {}", key);
            return;
        }
        let key = key.clone();
        self.remove_pod(&key, EventSource::Session, true).await;
    }

    async fn remove_pod(&mut self, key: &PodKey, source: EventSource, dismiss: bool) {
        self.autohide.cancel(key);
        if let Some(pipeline) = &self.pipeline {
            pipeline.cancel(key);
        }
        self.throttle.forget(key);

        let Some(mut pod) = self.registry.take(key) else {
            return;
        };
        let focus_moved = self.focus.on_pod_removed(key);
        if matches!(&self.detail, DetailPanel::Shown(k) | DetailPanel::Closing(k) if k == key) {
            self.detail = DetailPanel::Hidden;
        }
        debug!("Removed pod {}", key);

        if dismiss {
            pod.dismissed = true;
            let snapshot = pod.snapshot();
            self.dismissed.retain(|dismissed| &dismissed.key != key);
            self.dismissed.push(snapshot.clone());
            self.bus
                .emit_pod(EventType::PodDismissed, snapshot, source)
                .await
                .ok();
        }

        self.relayout(vec![(key.clone(), pod.pending_target)]).await;
        if focus_moved {
            self.emit_focus().await;
        }
    }

    async fn restore(&mut self, key: &PodKey) -> bool {
        let Some(index) = self.dismissed.iter().position(|pod| &pod.key == key) else {
            debug!("{} is not dismissed", key);
            return false;
        };

        let records = match self.host.list_all().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Cannot restore {}: {}", key, e);
                return false;
            }
        };
        let Some(record) = records
            .into_iter()
            .find(|record| &IdentityResolver::resolve(record) == key)
        else {
            info!("{} is gone from the host, dropping it", key);
            self.dismissed.remove(index);
            return false;
        };

        let dismissed = self.dismissed.remove(index);
        let key = self.adopt(record, EventType::PodRestored).await;
        if let Some(pod) = self.registry.get_mut(&key) {
            pod.original_filename = dismissed.original_filename;
        }
        self.relayout(Vec::new()).await;
        info!("Restored {}", key);
        true
    }

    async fn delete_permanently(&mut self, key: &PodKey) -> Result<(), HostError> {
        let record = self
            .registry
            .get(key)
            .map(|pod| pod.record.clone())
            .or_else(|| {
                self.dismissed
                    .iter()
                    .find(|pod| &pod.key == key)
                    .map(|pod| pod.record.clone())
            })
            .ok_or_else(|| HostError::NotFound(key.to_string()))?;

        self.host.erase(&record).await?;

        self.dismissed.retain(|pod| &pod.key != key);
        if let Some(pod) = self.registry.get_mut(key) {
            pod.phase = LifecyclePhase::PermanentlyDeleted;
            self.remove_pod(key, EventSource::User, false).await;
        }
        self.bus
            .emit_removed(EventType::DownloadErased, key.clone(), EventSource::User)
            .await
            .ok();
        info!("Erased {} from host history", key);
        Ok(())
    }

    fn schedule_autohide(&mut self, key: &PodKey) {
        if self.registry.get(key).is_some_and(|pod| !pod.dismissed) {
            self.autohide.schedule(key);
        }
    }

    fn is_dismissed(&self, key: &PodKey) -> bool {
        self.dismissed.iter().any(|pod| &pod.key == key)
    }

    async fn disable_ai(&mut self, message: String) {
        if !self.ai_enabled {
            return;
        }
        self.ai_enabled = false;
        self.bus
            .emit_system(EventType::AiRenamingDisabled, message)
            .await
            .ok();
    }

    fn detail_for_focus(&self) -> DetailPanel {
        match (&self.detail, self.focus.focused()) {
            (DetailPanel::Closing(closing), _) if self.registry.contains(closing) => {
                self.detail.clone()
            }
            (_, Some(focused)) if self.registry.contains(focused) => {
                DetailPanel::Shown(focused.clone())
            }
            _ => DetailPanel::Hidden,
        }
    }

    /// Recompute targets, remember them on the pods and publish the frame.
    /// `exits` are pods that just left, with their last target.
    async fn relayout(&mut self, exits: Vec<(PodKey, Option<PodTarget>)>) {
        let direction = self.focus.take_last_direction();
        let placements =
            compute_placements(self.focus.order(), self.focus.focused(), &self.geometry);

        let registry = &self.registry;
        let mut animations = plan_animations(
            &placements,
            |key| registry.get(key).and_then(|pod| pod.pending_target),
            direction,
        );
        animations.extend(
            exits
                .into_iter()
                .map(|(key, last)| exit_animation(key, last, direction)),
        );

        for placement in &placements {
            if let Some(pod) = self.registry.get_mut(&placement.key) {
                pod.pending_target = Some(placement.target);
                pod.visible = placement.target.is_shown();
            }
        }
        self.detail = self.detail_for_focus();

        let frame = LayoutFrame {
            placements,
            animations,
            detail: self.detail.clone(),
        };
        self.bus.emit_layout(frame).await.ok();
    }

    async fn emit_pod(&self, event_type: EventType, key: &PodKey, source: EventSource) {
        if let Some(pod) = self.registry.get(key) {
            self.bus.emit_pod(event_type, pod.snapshot(), source).await.ok();
        }
    }

    async fn emit_focus(&self) {
        self.bus.emit_focus(self.focus.focused().cloned()).await.ok();
    }
}

/// Status and progress lines for the download state. Left alone while a
/// rename status is showing.
fn refresh_status(pod: &mut PodState) {
    if pod.rename_status != RenameStatus::Idle {
        return;
    }
    let record = &pod.record;

    let (status, progress) = match record.state {
        DownloadState::Downloading => {
            let progress = match (record.total_bytes, record.percent_complete()) {
                (Some(total), Some(percent)) => format!(
                    "{} of {} ({}%)",
                    format_bytes(record.current_bytes),
                    format_bytes(total),
                    percent
                ),
                _ if record.current_bytes > 0 => {
                    format!("{} downloaded", format_bytes(record.current_bytes))
                }
                _ => "Calculating size...".to_string(),
            };
            ("Downloading...", progress)
        }
        DownloadState::Succeeded => ("Download completed", format_bytes(record.final_size())),
        DownloadState::Errored => (
            "Download failed",
            record
                .error_message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        DownloadState::Canceled => ("Download canceled", String::new()),
    };

    pod.status_text = status.to_string();
    pod.progress_text = progress;
}
