use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backends::{DownloadHost, FileSystem, HostEvent, InferenceApi};
use crate::config::Settings;
use crate::constants::EVENT_BUS_CAPACITY;
use crate::events::{EventBus, EventSubscriber};
use crate::models::{PodKey, PodSnapshot};
use crate::services::{Direction, Session, SessionInput, SessionSnapshot};
use crate::utils::{HostError, PodError};

/// Single consumer of host events and user commands.
///
/// Host events and session inputs are each handled in arrival order; the
/// session never sees two handlers at once.
#[derive(Debug)]
pub struct SessionWorker {
    session: Session,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    host_events: mpsc::UnboundedReceiver<HostEvent>,
}

impl SessionWorker {
    /// Build a session over the given collaborators. The host subscription is
    /// taken here so nothing that happens during startup is missed.
    pub fn new(
        settings: Settings,
        host: Arc<dyn DownloadHost>,
        fs: Arc<dyn FileSystem>,
        inference: Option<Arc<dyn InferenceApi>>,
    ) -> (Self, SessionHandle) {
        let (sender, inputs) = mpsc::unbounded_channel();
        let bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let host_events = host.subscribe();
        let session = Session::new(settings, host, fs, inference, bus.clone(), sender.clone());

        let worker = Self {
            session,
            inputs,
            host_events,
        };
        (worker, SessionHandle { sender, bus })
    }

    /// Build and start a worker on the current runtime
    pub fn spawn(
        settings: Settings,
        host: Arc<dyn DownloadHost>,
        fs: Arc<dyn FileSystem>,
        inference: Option<Arc<dyn InferenceApi>>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(settings, host, fs, inference);
        (handle, tokio::spawn(worker.run()))
    }

    pub async fn run(mut self) {
        info!("Session worker starting");
        self.session.startup().await;

        let mut host_open = true;
        loop {
            let input = tokio::select! {
                input = self.inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                event = self.host_events.recv(), if host_open => match event {
                    Some(event) => SessionInput::Host(event),
                    None => {
                        debug!("Host event stream closed");
                        host_open = false;
                        continue;
                    }
                },
            };

            if !self.session.handle(input).await {
                break;
            }
        }

        self.session.shutdown();
        info!("Session worker stopped");
    }
}

/// Cloneable front end to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<SessionInput>,
    bus: Arc<EventBus>,
}

impl SessionHandle {
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.bus.subscribe()
    }

    fn send(&self, input: SessionInput) -> Result<(), PodError> {
        self.sender
            .send(input)
            .map_err(|_| PodError::SessionClosed)
    }

    async fn request<T>(
        &self,
        input: impl FnOnce(oneshot::Sender<T>) -> SessionInput,
    ) -> Result<T, PodError> {
        let (reply, response) = oneshot::channel();
        self.send(input(reply))?;
        response.await.map_err(|_| PodError::SessionClosed)
    }

    pub fn rotate(&self, direction: Direction) -> Result<(), PodError> {
        self.send(SessionInput::Rotate(direction))
    }

    pub fn focus(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Focus(key))
    }

    pub fn close(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Close(key))
    }

    pub fn undo(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Undo(key))
    }

    pub fn cancel_download(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::CancelDownload(key))
    }

    pub fn resume(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Resume(key))
    }

    /// Open a finished download with the system's default handler
    pub fn open(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Open(key))
    }

    pub fn interact(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::Interact(key))
    }

    pub fn resize(&self, container_width: f32) -> Result<(), PodError> {
        self.send(SessionInput::Resize(container_width))
    }

    /// Ask for an AI rename of a finished download right away
    pub fn rename(&self, key: PodKey) -> Result<(), PodError> {
        self.send(SessionInput::StartRename(key))
    }

    /// Bring a dismissed pod back. `false` when it is not dismissed or the
    /// host no longer has the download.
    pub async fn restore(&self, key: PodKey) -> Result<bool, PodError> {
        self.request(|reply| SessionInput::Restore { key, reply })
            .await
    }

    /// Erase a download from the host's history
    pub async fn delete_permanently(&self, key: PodKey) -> Result<Result<(), HostError>, PodError> {
        self.request(|reply| SessionInput::DeletePermanently { key, reply })
            .await
    }

    pub async fn list_dismissed(&self) -> Result<Vec<PodSnapshot>, PodError> {
        self.request(SessionInput::ListDismissed).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, PodError> {
        self.request(SessionInput::Snapshot).await
    }

    pub fn shutdown(&self) -> Result<(), PodError> {
        self.send(SessionInput::Shutdown)
    }
}
