use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::{ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl, MessageContent};
use crate::backends::traits::{InferenceApi, InferenceRequest};
use crate::config::RenamingSettings;
use crate::constants::{INFERENCE_MAX_TOKENS, INFERENCE_TEMPERATURE};
use crate::utils::InferenceError;

const VERIFY_MAX_TOKENS: u32 = 5;

/// Chat-completions client for Mistral's vision models
#[derive(Clone)]
pub struct MistralClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for MistralClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl MistralClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::from_reqwest)?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn from_settings(settings: &RenamingSettings) -> Result<Self, InferenceError> {
        Self::new(
            settings.api_url.clone(),
            settings.api_key.clone(),
            settings.model.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn build_request(&self, request: InferenceRequest) -> ChatRequest {
        let mut parts = vec![ContentPart::Text {
            text: request.prompt,
        }];
        if let Some(image) = request.image {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(MessageContent::Parts(parts))],
            max_tokens: INFERENCE_MAX_TOKENS,
            temperature: Some(INFERENCE_TEMPERATURE),
        }
    }

    async fn send(&self, payload: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        if self.api_key.trim().is_empty() {
            return Err(InferenceError::MissingApiKey);
        }

        debug!("Sending request to {} (model {})", self.api_url, self.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(InferenceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            warn!("Inference API returned {}: {}", status, body);
            return Err(InferenceError::from_status(status.as_u16(), body, retry_after));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl InferenceApi for MistralClient {
    async fn complete(
        &self,
        request: InferenceRequest,
        cancel: &CancellationToken,
    ) -> Result<String, InferenceError> {
        if cancel.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }

        let payload = self.build_request(request);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Inference request cancelled");
                return Err(InferenceError::Cancelled);
            }
            response = self.send(&payload) => response?,
        };

        let text = response
            .first_text()
            .ok_or(InferenceError::EmptyResponse)?
            .to_string();
        debug!("Inference returned {:?}", text);
        Ok(text)
    }

    async fn verify(&self) -> Result<(), InferenceError> {
        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user(MessageContent::Text(
                    "Hello, this is a test connection. Respond with 'ok'.".to_string(),
                )),
            ],
            max_tokens: VERIFY_MAX_TOKENS,
            temperature: None,
        };

        self.send(&payload).await.map(|_| ())
    }
}
