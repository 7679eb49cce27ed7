//! Call lifecycle events for subscribers outside the call flow

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::models::{AttributionSnapshot, CallStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    /// A call row was created and the forward leg is being dialed
    Started {
        call_id: i64,
        company_id: i64,
        external_id: String,
        first_call: bool,
        attribution: AttributionSnapshot,
    },
    /// Cleanup settled the call's final status
    Ended {
        call_id: i64,
        external_id: String,
        status: CallStatus,
        duration: Option<i32>,
    },
}

pub type CallEventSender = broadcast::Sender<CallEvent>;

pub fn channel() -> CallEventSender {
    let (tx, _) = broadcast::channel(256);
    tx
}

/// Publish without caring whether anyone listens
pub fn publish(events: &CallEventSender, event: CallEvent) {
    if events.send(event).is_err() {
        tracing::debug!("No call event subscribers");
    }
}

/// Log every event until cancelled
pub async fn log_events(events: CallEventSender, cancel: CancellationToken) {
    let mut rx = events.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(CallEvent::Started { call_id, company_id, external_id, first_call, attribution }) => {
                    tracing::info!(
                        "Call {} ({}) started for company {}: source={} first_call={}",
                        call_id, external_id, company_id, attribution.source, first_call
                    );
                }
                Ok(CallEvent::Ended { call_id, external_id, status, duration }) => {
                    tracing::info!(
                        "Call {} ({}) ended: status={} duration={:?}",
                        call_id, external_id, status, duration
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Call event log skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
