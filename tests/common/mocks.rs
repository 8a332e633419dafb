use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tidy_downloads::backends::{InferenceApi, InferenceRequest};
use tidy_downloads::utils::InferenceError;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Error(InferenceError),
    /// Wait for the caller to cancel
    Hang,
}

/// Inference API answering from a script
#[derive(Debug, Default)]
pub struct MockInference {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<InferenceRequest>>,
    verify_error: Option<InferenceError>,
}

impl MockInference {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| Reply::Text(text.to_string())))
    }

    /// An API whose startup check fails
    pub fn rejecting_key() -> Self {
        Self {
            verify_error: Some(InferenceError::Http {
                status: 401,
                message: "Unauthorized".to_string(),
            }),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceApi for MockInference {
    async fn complete(
        &self,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InferenceError> {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        self.requests.lock().unwrap().push(request);

        let reply = self.replies.lock().unwrap().pop_front();
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
        match &self.verify_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
