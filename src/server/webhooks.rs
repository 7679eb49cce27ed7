//! Provider webhook routes
//!
//! Form-encoded callbacks (POST, or GET with the same fields in the query).
//! Every handler answers 200 with TwiML, including for payloads that fail
//! to parse.

use std::sync::Arc;

use axum::{
    extract::{rejection::FormRejection, State},
    routing::get,
    Form, Router,
};
use serde::Deserialize;

use super::routing::{IncomingCall, RecordingNotice, VoiceResponse};
use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct IncomingCallForm {
    pub call_sid: String,
    pub call_status: Option<String>,
    pub direction: Option<String>,
    pub to: String,
    pub to_country: Option<String>,
    pub from: String,
    pub from_country: Option<String>,
    pub from_city: Option<String>,
    pub from_state: Option<String>,
    pub from_zip: Option<String>,
    pub caller_name: Option<String>,
}

impl From<IncomingCallForm> for IncomingCall {
    fn from(form: IncomingCallForm) -> Self {
        IncomingCall {
            call_sid: form.call_sid,
            to: form.to,
            to_country: form.to_country,
            from: form.from,
            from_country: form.from_country,
            caller_name: form.caller_name,
            from_city: form.from_city,
            from_state: form.from_state,
            from_zip: form.from_zip,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DigitsForm {
    pub call_sid: String,
    pub digits: Option<String>,
}

/// Legs dialed from the caller's call carry the caller's sid as parent
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ChildLegForm {
    pub call_sid: String,
    pub parent_call_sid: Option<String>,
}

impl ChildLegForm {
    fn caller_sid(&self) -> &str {
        self.parent_call_sid
            .as_deref()
            .filter(|sid| !sid.is_empty())
            .unwrap_or(&self.call_sid)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DialEndedForm {
    pub call_sid: String,
    pub dial_call_status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RecordingForm {
    pub call_sid: String,
    pub recording_sid: String,
    pub recording_url: String,
    pub recording_duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CleanupForm {
    pub call_sid: String,
    pub call_duration: Option<String>,
}

fn seconds(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|d| d.trim().parse().ok())
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/webhooks/incoming-call", get(incoming_call).post(incoming_call))
        .route("/v1/webhooks/incoming-call-collect", get(incoming_call_collect).post(incoming_call_collect))
        .route("/v1/webhooks/dialed-call-preconnect", get(dialed_call_preconnect).post(dialed_call_preconnect))
        .route(
            "/v1/webhooks/dialed-call-agent-join-conference",
            get(dialed_call_agent_join_conference).post(dialed_call_agent_join_conference),
        )
        .route(
            "/v1/webhooks/dialed-call-conversion-collect",
            get(dialed_call_conversion_collect).post(dialed_call_conversion_collect),
        )
        .route("/v1/webhooks/dialed-call-ended", get(dialed_call_ended).post(dialed_call_ended))
        .route(
            "/v1/webhooks/dialed-call-recording-available",
            get(dialed_call_recording_available).post(dialed_call_recording_available),
        )
        .route("/v1/webhooks/incoming-call-cleanup", get(incoming_call_cleanup).post(incoming_call_cleanup))
}

async fn incoming_call(
    State(state): State<Arc<AppState>>,
    form: Result<Form<IncomingCallForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => {
            tracing::debug!(
                "incoming-call {} status={:?} direction={:?}",
                form.call_sid,
                form.call_status,
                form.direction
            );
            state.engine.incoming_call(form.into()).await
        }
        Err(e) => {
            tracing::warn!("Malformed incoming-call payload: {}", e);
            VoiceResponse::new().reject()
        }
    }
}

async fn incoming_call_collect(
    State(state): State<Arc<AppState>>,
    form: Result<Form<DigitsForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.collect(&form.call_sid, form.digits.as_deref()).await,
        Err(e) => {
            tracing::warn!("Malformed keypad payload: {}", e);
            VoiceResponse::new().reject()
        }
    }
}

async fn dialed_call_preconnect(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ChildLegForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.preconnect(form.caller_sid()).await,
        Err(e) => {
            tracing::warn!("Malformed preconnect payload: {}", e);
            VoiceResponse::new()
        }
    }
}

async fn dialed_call_agent_join_conference(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ChildLegForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.agent_join(form.caller_sid()).await,
        Err(e) => {
            tracing::warn!("Malformed agent join payload: {}", e);
            VoiceResponse::new().hangup()
        }
    }
}

async fn dialed_call_conversion_collect(
    State(state): State<Arc<AppState>>,
    form: Result<Form<DigitsForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.conversion_collect(&form.call_sid, form.digits.as_deref()).await,
        Err(e) => {
            tracing::warn!("Malformed conversion payload: {}", e);
            VoiceResponse::new()
        }
    }
}

async fn dialed_call_ended(
    State(state): State<Arc<AppState>>,
    form: Result<Form<DialEndedForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.dial_ended(&form.call_sid, &form.dial_call_status).await,
        Err(e) => {
            tracing::warn!("Malformed dial-ended payload: {}", e);
            VoiceResponse::new().hangup()
        }
    }
}

async fn dialed_call_recording_available(
    State(state): State<Arc<AppState>>,
    form: Result<Form<RecordingForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => state.engine.recording_available(RecordingNotice {
            duration_seconds: seconds(form.recording_duration.as_deref()).unwrap_or(0),
            call_sid: form.call_sid,
            recording_sid: form.recording_sid,
            recording_url: form.recording_url,
        }),
        Err(e) => {
            tracing::warn!("Malformed recording payload: {}", e);
            VoiceResponse::new()
        }
    }
}

async fn incoming_call_cleanup(
    State(state): State<Arc<AppState>>,
    form: Result<Form<CleanupForm>, FormRejection>,
) -> VoiceResponse {
    match form {
        Ok(Form(form)) => {
            state
                .engine
                .cleanup(&form.call_sid, seconds(form.call_duration.as_deref()))
                .await
        }
        Err(e) => {
            tracing::warn!("Malformed cleanup payload: {}", e);
            VoiceResponse::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_leg_prefers_parent_sid() {
        let form = ChildLegForm {
            call_sid: "CA2".to_string(),
            parent_call_sid: Some("CA1".to_string()),
        };
        assert_eq!(form.caller_sid(), "CA1");

        let form = ChildLegForm {
            call_sid: "CA2".to_string(),
            parent_call_sid: Some(String::new()),
        };
        assert_eq!(form.caller_sid(), "CA2");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(seconds(Some("42")), Some(42));
        assert_eq!(seconds(Some("n/a")), None);
        assert_eq!(seconds(None), None);
    }
}
