//! Speech-to-text for stored recordings

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Empty transcript")]
    Empty,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Whisper-style endpoint: multipart `file` upload, JSON `{"text": ...}` back
#[derive(Clone)]
pub struct HttpTranscriber {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTranscriber {
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_url,
            api_key,
            model: "whisper-1".to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, TranscriptionError> {
        let part = multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let mut request = self.client.post(&self.api_url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Api { status, message });
        }

        let body: TranscriptionResponse = response.json().await?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(TranscriptionError::Empty);
        }
        Ok(text)
    }
}
