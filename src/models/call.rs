use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::attribution::AttributionSnapshot;

/// Longest status label persisted for provider values outside the table
pub const MAX_STATUS_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Call {
    pub id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "phoneNumberId")]
    pub phone_number_id: i64,
    #[serde(rename = "keywordTrackingPoolId")]
    pub keyword_tracking_pool_id: Option<i64>,
    #[serde(rename = "keywordTrackingPoolSessionId")]
    pub keyword_tracking_pool_session_id: Option<i64>,
    #[serde(rename = "contactId")]
    pub contact_id: i64,
    /// Provider call id (CallSid), the join key for every callback
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub direction: CallDirection,
    #[sqlx(try_from = "String")]
    pub status: CallStatus,
    #[serde(rename = "firstCall")]
    pub first_call: bool,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attribution: AttributionSnapshot,
    #[serde(rename = "recordingEnabled")]
    pub recording_enabled: bool,
    #[serde(rename = "transcriptionEnabled")]
    pub transcription_enabled: bool,
    #[serde(rename = "forwardedTo")]
    pub forwarded_to: String,
    pub duration: Option<i32>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCall {
    pub company_id: i64,
    pub phone_number_id: i64,
    pub keyword_tracking_pool_id: Option<i64>,
    pub keyword_tracking_pool_session_id: Option<i64>,
    pub contact_id: i64,
    pub external_id: String,
    pub direction: CallDirection,
    pub status: CallStatus,
    pub first_call: bool,
    pub attribution: AttributionSnapshot,
    pub recording_enabled: bool,
    pub transcription_enabled: bool,
    pub forwarded_to: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::Type)]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "call_direction", rename_all = "PascalCase")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Call status as stored; provider values outside the table are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Abandoned,
    Busy,
    Unanswered,
    Failed,
    Other(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CallStatus::Queued => "Queued",
            CallStatus::Ringing => "Ringing",
            CallStatus::InProgress => "In Progress",
            CallStatus::Completed => "Completed",
            CallStatus::Abandoned => "Abandoned",
            CallStatus::Busy => "Busy",
            CallStatus::Unanswered => "Unanswered",
            CallStatus::Failed => "Failed",
            CallStatus::Other(label) => label,
        }
    }

    /// Translate a provider status (CallStatus / DialCallStatus) into ours
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => CallStatus::Queued,
            "ringing" => CallStatus::Ringing,
            "answered" | "in-progress" => CallStatus::InProgress,
            "completed" => CallStatus::Completed,
            "no-answer" => CallStatus::Unanswered,
            "busy" => CallStatus::Busy,
            "canceled" => CallStatus::Abandoned,
            "failed" => CallStatus::Failed,
            _ => CallStatus::Other(title_case(raw, MAX_STATUS_LEN)),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Completed
                | CallStatus::Abandoned
                | CallStatus::Busy
                | CallStatus::Unanswered
                | CallStatus::Failed
        )
    }

    /// Position in the forward-only order. Provider labels outside the
    /// table arrive between ringing and connect.
    pub fn rank(&self) -> i16 {
        match self {
            CallStatus::Queued => 0,
            CallStatus::Ringing => 1,
            CallStatus::Other(_) => 2,
            CallStatus::InProgress => 3,
            _ => 4,
        }
    }

    /// Statuses only move forward and never leave a terminal state
    pub fn can_advance_to(&self, next: &CallStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Status a call settles on when the provider reports it has ended
    pub fn finalized(&self) -> CallStatus {
        match self {
            CallStatus::Queued | CallStatus::Ringing | CallStatus::Other(_) => CallStatus::Abandoned,
            CallStatus::InProgress => CallStatus::Completed,
            terminal => terminal.clone(),
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CallStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Queued" => CallStatus::Queued,
            "Ringing" => CallStatus::Ringing,
            "In Progress" => CallStatus::InProgress,
            "Completed" => CallStatus::Completed,
            "Abandoned" => CallStatus::Abandoned,
            "Busy" => CallStatus::Busy,
            "Unanswered" => CallStatus::Unanswered,
            "Failed" => CallStatus::Failed,
            _ => CallStatus::Other(value),
        }
    }
}

impl From<CallStatus> for String {
    fn from(status: CallStatus) -> Self {
        status.as_str().to_string()
    }
}

fn title_case(raw: &str, max_len: usize) -> String {
    let words: Vec<String> = raw
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect();

    words.join(" ").chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_table() {
        assert_eq!(CallStatus::from_provider("queued"), CallStatus::Queued);
        assert_eq!(CallStatus::from_provider("ringing"), CallStatus::Ringing);
        assert_eq!(CallStatus::from_provider("answered"), CallStatus::InProgress);
        assert_eq!(CallStatus::from_provider("in-progress"), CallStatus::InProgress);
        assert_eq!(CallStatus::from_provider("completed"), CallStatus::Completed);
        assert_eq!(CallStatus::from_provider("no-answer"), CallStatus::Unanswered);
        assert_eq!(CallStatus::from_provider("busy"), CallStatus::Busy);
        assert_eq!(CallStatus::from_provider("canceled"), CallStatus::Abandoned);
        assert_eq!(CallStatus::from_provider("failed"), CallStatus::Failed);
    }

    #[test]
    fn test_unknown_provider_status_is_title_cased() {
        assert_eq!(
            CallStatus::from_provider("machine-detected"),
            CallStatus::Other("Machine Detected".to_string())
        );

        let long = "x".repeat(100);
        match CallStatus::from_provider(&long) {
            CallStatus::Other(label) => assert_eq!(label.chars().count(), MAX_STATUS_LEN),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_stored_labels_round_trip() {
        for status in [
            CallStatus::Queued,
            CallStatus::Ringing,
            CallStatus::InProgress,
            CallStatus::Completed,
            CallStatus::Abandoned,
            CallStatus::Busy,
            CallStatus::Unanswered,
            CallStatus::Failed,
        ] {
            assert_eq!(CallStatus::from(String::from(status.clone())), status);
        }
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert!(CallStatus::Ringing.can_advance_to(&CallStatus::InProgress));
        assert!(CallStatus::InProgress.can_advance_to(&CallStatus::Completed));
        assert!(!CallStatus::InProgress.can_advance_to(&CallStatus::Ringing));
        assert!(!CallStatus::Completed.can_advance_to(&CallStatus::InProgress));
        assert!(!CallStatus::Abandoned.can_advance_to(&CallStatus::Completed));
    }

    #[test]
    fn test_unmapped_status_sits_between_ringing_and_connect() {
        let detected = CallStatus::Other("Machine Detected".to_string());
        assert!(CallStatus::Ringing.can_advance_to(&detected));
        assert!(!detected.can_advance_to(&CallStatus::Ringing));
        assert!(detected.can_advance_to(&CallStatus::InProgress));
        assert!(!CallStatus::InProgress.can_advance_to(&detected));
        assert_eq!(detected.finalized(), CallStatus::Abandoned);
    }

    #[test]
    fn test_finalized_status() {
        assert_eq!(CallStatus::Ringing.finalized(), CallStatus::Abandoned);
        assert_eq!(CallStatus::InProgress.finalized(), CallStatus::Completed);
        assert_eq!(CallStatus::Busy.finalized(), CallStatus::Busy);
    }
}
