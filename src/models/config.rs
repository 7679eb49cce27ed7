use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Routing configuration shared by a flat number or every number of a pool
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhoneNumberConfig {
    pub id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    pub name: String,
    #[serde(rename = "forwardToCountryCode")]
    pub forward_to_country_code: String,
    #[serde(rename = "forwardToNumber")]
    pub forward_to_number: String,

    #[serde(rename = "greetingEnabled")]
    pub greeting_enabled: bool,
    #[serde(rename = "greetingMessageType")]
    pub greeting_message_type: Option<GreetingType>,
    #[serde(rename = "greetingMessage")]
    pub greeting_message: Option<String>,
    #[serde(rename = "greetingAudioUrl")]
    pub greeting_audio_url: Option<String>,
    #[serde(rename = "greetingVoice")]
    pub greeting_voice: Option<String>,
    #[serde(rename = "greetingLanguage")]
    pub greeting_language: Option<String>,

    #[serde(rename = "keypadEnabled")]
    pub keypad_enabled: bool,
    #[serde(rename = "keypadAnswer")]
    pub keypad_answer: Option<i32>,
    /// Wrong entries tolerated before the call is rejected
    #[serde(rename = "keypadAttempts")]
    pub keypad_attempts: i32,
    #[serde(rename = "keypadPrompt")]
    pub keypad_prompt: Option<String>,
    #[serde(rename = "keypadFailureMessage")]
    pub keypad_failure_message: Option<String>,

    #[serde(rename = "whisperEnabled")]
    pub whisper_enabled: bool,
    #[serde(rename = "whisperMessage")]
    pub whisper_message: Option<String>,

    #[serde(rename = "recordingEnabled")]
    pub recording_enabled: bool,
    #[serde(rename = "transcriptionEnabled")]
    pub transcription_enabled: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "greeting_type", rename_all = "PascalCase")]
pub enum GreetingType {
    Text,
    Audio,
}

impl PhoneNumberConfig {
    /// E.164 form of the forward-to number
    pub fn forward_to(&self) -> String {
        format!("+{}{}", self.forward_to_country_code, self.forward_to_number)
    }

    /// The keypad gate only runs when it is enabled and has an answer to check
    pub fn keypad_gate(&self) -> Option<i32> {
        if self.keypad_enabled {
            self.keypad_answer
        } else {
            None
        }
    }

    pub fn whisper(&self) -> Option<&str> {
        if self.whisper_enabled {
            self.whisper_message.as_deref().filter(|m| !m.trim().is_empty())
        } else {
            None
        }
    }

    /// Transcription only applies to recorded calls
    pub fn transcribes(&self) -> bool {
        self.recording_enabled && self.transcription_enabled
    }
}
