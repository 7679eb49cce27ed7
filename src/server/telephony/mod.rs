//! Twilio REST client for recording media

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Telephony credentials not configured")]
    NotConfigured,
}

/// Provider operations the recording pipeline needs
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Download the media behind a RecordingUrl
    async fn fetch_recording(&self, recording_url: &str) -> Result<Vec<u8>, TelephonyError>;

    /// Remove the provider's copy once we hold our own
    async fn delete_recording(&self, recording_sid: &str) -> Result<(), TelephonyError>;
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    message: Option<String>,
}

#[derive(Clone)]
pub struct TwilioClient {
    client: Client,
    account_sid: String,
    auth_token: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String) -> Self {
        Self {
            client: Client::new(),
            account_sid,
            auth_token,
            base_url: "https://api.twilio.com/2010-04-01".to_string(),
        }
    }

    fn ensure_configured(&self) -> Result<(), TelephonyError> {
        if self.account_sid.is_empty() || self.auth_token.is_empty() {
            return Err(TelephonyError::NotConfigured);
        }
        Ok(())
    }

    /// RecordingUrl comes without an extension; asking for .mp3 gets audio
    fn media_url(recording_url: &str) -> String {
        let trimmed = recording_url.trim_end_matches('/');
        if trimmed.ends_with(".mp3") || trimmed.ends_with(".wav") {
            trimmed.to_string()
        } else {
            format!("{}.mp3", trimmed)
        }
    }

    fn recording_resource_url(&self, recording_sid: &str) -> String {
        format!(
            "{}/Accounts/{}/Recordings/{}.json",
            self.base_url, self.account_sid, recording_sid
        )
    }

    async fn api_error(response: reqwest::Response) -> TelephonyError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<TwilioErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(body);
        TelephonyError::Api { status, message }
    }
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    async fn fetch_recording(&self, recording_url: &str) -> Result<Vec<u8>, TelephonyError> {
        self.ensure_configured()?;

        let response = self
            .client
            .get(Self::media_url(recording_url))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_recording(&self, recording_sid: &str) -> Result<(), TelephonyError> {
        self.ensure_configured()?;

        let response = self
            .client
            .delete(self.recording_resource_url(recording_sid))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await?;

        // Already gone is as good as deleted
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }

        Err(Self::api_error(response).await)
    }
}
