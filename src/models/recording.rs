use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallRecording {
    pub id: i64,
    #[serde(rename = "callId")]
    pub call_id: i64,
    /// Provider recording id (RecordingSid)
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub path: String,
    #[serde(rename = "durationSeconds")]
    pub duration_seconds: i32,
    #[serde(rename = "fileSize")]
    pub file_size: i64,
    #[serde(rename = "transcriptionPath")]
    pub transcription_path: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCallRecording {
    pub call_id: i64,
    pub external_id: String,
    pub path: String,
    pub duration_seconds: i32,
    pub file_size: i64,
    pub transcription_path: Option<String>,
    pub created_at: DateTime<Utc>,
}
