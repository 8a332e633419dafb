#![cfg(test)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

use crate::backends::{InferenceApi, InferenceRequest};
use crate::models::{DownloadRecord, DownloadState};
use crate::utils::InferenceError;

/// What the scripted model does for one call
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(InferenceError),
    /// Block until the caller's token is cancelled
    Hang,
}

/// Inference API that answers from a script, recording every request
#[derive(Debug, Default)]
pub struct ScriptedInference {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn text(reply: &str) -> Self {
        Self::new([Reply::Text(reply.to_string())])
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl InferenceApi for ScriptedInference {
    async fn complete(
        &self,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InferenceError> {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        self.requests.lock().push(request);

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Error(error)) => Err(error),
            Some(Reply::Hang) => {
                cancel.cancelled().await;
                Err(InferenceError::Cancelled)
            }
            None => Err(InferenceError::EmptyResponse),
        }
    }

    async fn verify(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// A finished download at `path`
pub fn finished_record(path: &str) -> DownloadRecord {
    DownloadRecord::new(format!("https://example.com/{}", path), Utc::now())
        .with_path(path)
        .with_state(DownloadState::Succeeded)
}
