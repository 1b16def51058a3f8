//! Text-to-image client. Renders a prompt through an OpenAI-compatible
//! `images/generations` endpoint and stores the result in the object store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::error::ObjectStorageError;
use crate::model::{ImageLocation, image_key};
use crate::store::ObjectStore;

pub const IMAGE_CONTENT_TYPE: &str = "image/png";

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("response contained no image")]
    MissingImage,

    #[error("invalid image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to store image: {}", crate::unpack_error(.0))]
    Storage(#[from] ObjectStorageError),
}

#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    /// Renders `prompt` into a new object for the highlight and returns its URL.
    async fn generate(
        &self,
        prompt: &str,
        owner_id: &str,
        highlight_id: &str,
        book_id: &str,
    ) -> Result<String, SynthesisError>;

    /// Renders `prompt` over whatever is stored at `key`.
    async fn overwrite(&self, prompt: &str, key: &str) -> Result<(), SynthesisError>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
}

pub struct OpenAiImageSynthesizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    size: String,
    store: Arc<dyn ObjectStore>,
    location: ImageLocation,
}

impl OpenAiImageSynthesizer {
    pub fn new(
        cfg: &config::Synthesis,
        store: Arc<dyn ObjectStore>,
        location: ImageLocation,
    ) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            size: cfg.size.clone(),
            store,
            location,
        })
    }

    async fn render(&self, prompt: &str) -> Result<Vec<u8>, SynthesisError> {
        let request = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %body, "image generation rejected");
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GenerationResponse = response.json().await?;
        let encoded = payload
            .data
            .into_iter()
            .find_map(|image| image.b64_json)
            .ok_or(SynthesisError::MissingImage)?;

        Ok(BASE64.decode(encoded.as_bytes())?)
    }

    async fn render_into(&self, prompt: &str, key: &str) -> Result<(), SynthesisError> {
        let bytes = self.render(prompt).await?;
        tracing::debug!(key, bytes = bytes.len(), "image rendered");
        self.store.put(key, bytes, IMAGE_CONTENT_TYPE).await?;
        Ok(())
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiImageSynthesizer {
    async fn generate(
        &self,
        prompt: &str,
        owner_id: &str,
        highlight_id: &str,
        book_id: &str,
    ) -> Result<String, SynthesisError> {
        let key = image_key(owner_id, book_id, highlight_id);
        self.render_into(prompt, &key).await?;
        Ok(self.location.url_for(&key))
    }

    async fn overwrite(&self, prompt: &str, key: &str) -> Result<(), SynthesisError> {
        self.render_into(prompt, key).await
    }
}
