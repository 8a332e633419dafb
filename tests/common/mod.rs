pub mod builders;
pub mod mocks;

use std::sync::Arc;
use tidy_downloads::backends::{InferenceApi, MemoryFileSystem, MemoryHost};
use tidy_downloads::models::PodKey;
use tidy_downloads::{SessionHandle, SessionSnapshot, SessionWorker, Settings};
use tokio::task::JoinHandle;

pub use builders::{DownloadBuilder, settings_without_stable_focus, test_settings};
pub use mocks::{MockInference, Reply};

/// A running session over in-memory collaborators
pub struct TestContext {
    pub host: Arc<MemoryHost>,
    pub fs: Arc<MemoryFileSystem>,
    pub inference: Option<Arc<MockInference>>,
    pub handle: SessionHandle,
    worker: JoinHandle<()>,
}

impl TestContext {
    pub fn start(settings: Settings, inference: Option<MockInference>) -> Self {
        Self::start_with(
            settings,
            Arc::new(MemoryHost::new()),
            Arc::new(MemoryFileSystem::new()),
            inference,
        )
    }

    pub fn start_with(
        settings: Settings,
        host: Arc<MemoryHost>,
        fs: Arc<MemoryFileSystem>,
        inference: Option<MockInference>,
    ) -> Self {
        let inference = inference.map(Arc::new);
        let (handle, worker) = SessionWorker::spawn(
            settings,
            host.clone(),
            fs.clone(),
            inference
                .clone()
                .map(|api| api as Arc<dyn InferenceApi>),
        );

        Self {
            host,
            fs,
            inference,
            handle,
            worker,
        }
    }

    pub fn inference(&self) -> &MockInference {
        self.inference
            .as_deref()
            .expect("context started without an inference API")
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        settle().await;
        self.handle.snapshot().await.expect("session stopped")
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().expect("session already stopped");
        self.worker.await.expect("session worker panicked");
    }
}

/// Let the worker drain everything posted so far
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Sleep on the (paused) test clock, then settle
pub async fn advance(millis: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
    settle().await;
}

pub fn key(path: &str) -> PodKey {
    PodKey::new(path)
}
