//! Inbound call flow
//!
//! Each provider callback lands on one method of [`IvrEngine`] and gets a
//! TwiML document back. Nothing here ever fails the HTTP request: store
//! errors and bad payloads become `<Reject/>`, `<Hangup/>` or an empty
//! response. State between callbacks lives in the `ivr_progress` row for
//! the CallSid.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::phone;
use super::resolver::{resolve_call, CallerDetails};
use super::twiml::{Dial, VoiceResponse};
use super::variables;
use crate::models::{
    CallDirection, CallStatus, GreetingType, IvrProgress, IvrStage, NewBlockedCall, NewCall, PhoneNumber,
    PhoneNumberConfig,
};
use crate::server::events::{self, CallEvent, CallEventSender};
use crate::server::recordings::{RecordingJob, RecordingQueue};
use crate::server::store::{Store, StoreResult, StoreTx};

#[derive(Debug, Clone)]
pub struct IvrSettings {
    /// Externally reachable base for callback URLs
    pub public_base_url: String,
    pub keypad_timeout_seconds: u32,
    pub default_voice: String,
    pub default_language: String,
}

impl IvrSettings {
    pub fn callback(&self, hook: &str) -> String {
        format!("{}/v1/webhooks/{}", self.public_base_url.trim_end_matches('/'), hook)
    }
}

/// Fields of the provider's incoming-call webhook
#[derive(Debug, Clone, Default)]
pub struct IncomingCall {
    pub call_sid: String,
    pub to: String,
    pub to_country: Option<String>,
    pub from: String,
    pub from_country: Option<String>,
    pub caller_name: Option<String>,
    pub from_city: Option<String>,
    pub from_state: Option<String>,
    pub from_zip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecordingNotice {
    pub call_sid: String,
    pub recording_sid: String,
    pub recording_url: String,
    pub duration_seconds: i32,
}

pub struct IvrEngine {
    store: Arc<dyn Store>,
    settings: IvrSettings,
    recordings: RecordingQueue,
    events: CallEventSender,
}

fn reject(reason: &str, call_sid: &str) -> VoiceResponse {
    tracing::warn!("Rejecting call {}: {}", call_sid, reason);
    VoiceResponse::new().reject()
}

impl IvrEngine {
    pub fn new(store: Arc<dyn Store>, settings: IvrSettings, recordings: RecordingQueue, events: CallEventSender) -> Self {
        Self {
            store,
            settings,
            recordings,
            events,
        }
    }

    pub fn settings(&self) -> &IvrSettings {
        &self.settings
    }

    /// Entry point for a new inbound call
    pub async fn incoming_call(&self, call: IncomingCall) -> VoiceResponse {
        let call_sid = call.call_sid.clone();
        match self.try_incoming_call(call).await {
            Ok((response, event)) => {
                if let Some(event) = event {
                    events::publish(&self.events, event);
                }
                response
            }
            Err(e) => {
                tracing::error!("Incoming call {} failed: {}", call_sid, e);
                VoiceResponse::new().reject()
            }
        }
    }

    async fn try_incoming_call(&self, call: IncomingCall) -> StoreResult<(VoiceResponse, Option<CallEvent>)> {
        let now = Utc::now();
        let call_sid = call.call_sid.trim().to_string();
        if call_sid.is_empty() {
            return Ok((reject("missing CallSid", "-"), None));
        }
        let Some(to) = phone::parse(&call.to, call.to_country.as_deref()) else {
            return Ok((reject("unparseable To", &call_sid), None));
        };
        let Some(from) = phone::parse(&call.from, call.from_country.as_deref()) else {
            return Ok((reject("unparseable From", &call_sid), None));
        };

        let mut tx = self.store.begin().await?;

        let number = match tx.phone_number_by_number(&to.country_code, &to.number).await? {
            Some(number) if number.is_active() => number,
            Some(_) => return Ok((reject("dialed number is disabled", &call_sid), None)),
            None => return Ok((reject(&format!("unknown dialed number {}", to.e164()), &call_sid), None)),
        };

        let company = match tx.company(number.company_id).await? {
            Some(company) if company.is_enabled() => company,
            _ => return Ok((reject("company missing or disabled", &call_sid), None)),
        };

        if let Some(blocked) = tx
            .blocked_number(company.id, &from.country_code, &from.number)
            .await?
        {
            tx.insert_blocked_call(NewBlockedCall {
                blocked_phone_number_id: blocked.id,
                company_id: company.id,
                phone_number_id: number.id,
                external_id: call_sid.clone(),
                created_at: now,
            })
            .await?;
            tx.commit().await?;
            return Ok((reject(&format!("caller {} is blocked", from.e164()), &call_sid), None));
        }

        let config_id = match number.keyword_tracking_pool_id {
            Some(pool_id) => match tx.pool(pool_id).await? {
                Some(pool) if pool.is_enabled() => Some(pool.phone_number_config_id),
                _ => return Ok((reject("pool missing or disabled", &call_sid), None)),
            },
            None => number.phone_number_config_id,
        };
        let config = match config_id {
            Some(id) => tx.phone_number_config(id).await?,
            None => None,
        };
        let Some(config) = config else {
            return Ok((reject("number has no routing config", &call_sid), None));
        };

        let contact = tx
            .contact_by_number(company.id, &from.country_code, &from.number)
            .await?;
        if number.is_pool_number() && contact.is_none() && !tx.has_unclaimed_session(number.id, now).await? {
            return Ok((reject("pool number has no pending session for a new caller", &call_sid), None));
        }

        let mut caller = CallerDetails {
            country_code: from.country_code.clone(),
            number: from.number.clone(),
            city: call.from_city.clone().filter(|c| !c.is_empty()),
            state: call.from_state.clone().filter(|s| !s.is_empty()),
            zip: call.from_zip.clone().filter(|z| !z.is_empty()),
            country: call.from_country.clone().filter(|c| !c.is_empty()),
            ..CallerDetails::default()
        }
        .with_name(call.caller_name.as_deref());
        if let Some(contact) = &contact {
            caller.first_name = caller.first_name.or_else(|| contact.first_name.clone());
            caller.last_name = caller.last_name.or_else(|| contact.last_name.clone());
            caller.city = caller.city.or_else(|| contact.city.clone());
            caller.state = caller.state.or_else(|| contact.state.clone());
            caller.zip = caller.zip.or_else(|| contact.zip.clone());
            caller.country = caller.country.or_else(|| contact.country.clone());
        }

        let vars = variables::build(&caller, &number, &company);
        let mut progress = IvrProgress::new(
            call_sid.clone(),
            company.id,
            number.id,
            config.id,
            (from.country_code.as_str(), from.number.as_str()),
            vars,
            now,
        );
        tracing::info!(
            "Incoming call {} from {} to {} (company {})",
            call_sid,
            from.e164(),
            to.e164(),
            company.id
        );

        let response = self.greeting(&config, &progress.variables.0);

        if config.keypad_gate().is_some() {
            progress.advance(IvrStage::KeypadGate, now);
            tx.save_ivr_progress(&progress).await?;
            tx.commit().await?;
            return Ok((self.keypad_prompt(response, &config, &progress.variables.0), None));
        }

        let (response, event) = self
            .dial(tx.as_mut(), response, &mut progress, &config, &number, &caller, now)
            .await?;
        tx.commit().await?;
        Ok((response, event))
    }

    /// Keypad gate digit, or the redirect after a gather timeout
    pub async fn collect(&self, call_sid: &str, digits: Option<&str>) -> VoiceResponse {
        match self.try_collect(call_sid, digits).await {
            Ok((response, event)) => {
                if let Some(event) = event {
                    events::publish(&self.events, event);
                }
                response
            }
            Err(e) => {
                tracing::error!("Keypad collect for {} failed: {}", call_sid, e);
                VoiceResponse::new().reject()
            }
        }
    }

    async fn try_collect(&self, call_sid: &str, digits: Option<&str>) -> StoreResult<(VoiceResponse, Option<CallEvent>)> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let Some(mut progress) = tx.ivr_progress(call_sid).await? else {
            return Ok((reject("no keypad progress", call_sid), None));
        };
        if progress.stage != IvrStage::KeypadGate {
            tracing::debug!("Ignoring keypad input for {} in stage {:?}", call_sid, progress.stage);
            return Ok((VoiceResponse::new(), None));
        }

        let Some(config) = tx.phone_number_config(progress.phone_number_config_id).await? else {
            return Ok((reject("routing config disappeared", call_sid), None));
        };
        let Some(number) = tx.phone_number(progress.phone_number_id).await? else {
            return Ok((reject("dialed number disappeared", call_sid), None));
        };

        let entered = digits.map(str::trim).unwrap_or_default();
        let passed = match config.keypad_gate() {
            Some(answer) => entered == answer.to_string(),
            None => true,
        };

        if passed {
            let caller = caller_from_progress(&progress);
            let (response, event) = self
                .dial(tx.as_mut(), VoiceResponse::new(), &mut progress, &config, &number, &caller, now)
                .await?;
            tx.commit().await?;
            return Ok((response, event));
        }

        progress.failed_attempts += 1;
        progress.updated_at = now;
        tracing::info!(
            "Call {} keypad miss {} of {} (entered {:?})",
            call_sid,
            progress.failed_attempts,
            config.keypad_attempts,
            entered
        );

        if progress.failed_attempts <= config.keypad_attempts {
            tx.save_ivr_progress(&progress).await?;
            tx.commit().await?;
            return Ok((self.keypad_prompt(VoiceResponse::new(), &config, &progress.variables.0), None));
        }

        tx.delete_ivr_progress(call_sid).await?;
        tx.commit().await?;

        let mut response = VoiceResponse::new();
        if let Some(message) = config.keypad_failure_message.as_deref().filter(|m| !m.trim().is_empty()) {
            let (voice, language) = self.voice(&config);
            response = response.say(variables::substitute(message, &progress.variables.0), Some(voice), Some(language));
        }
        tracing::warn!("Rejecting call {}: keypad attempts exhausted", call_sid);
        Ok((response.reject(), None))
    }

    /// Whisper played to the answering agent before the legs are bridged
    pub async fn preconnect(&self, parent_call_sid: &str) -> VoiceResponse {
        self.try_preconnect(parent_call_sid).await.unwrap_or_else(|e| {
            tracing::error!("Preconnect for {} failed: {}", parent_call_sid, e);
            VoiceResponse::new()
        })
    }

    async fn try_preconnect(&self, parent_call_sid: &str) -> StoreResult<VoiceResponse> {
        let mut tx = self.store.begin().await?;
        let Some(progress) = tx.ivr_progress(parent_call_sid).await? else {
            tracing::warn!("No progress for preconnect of {}", parent_call_sid);
            return Ok(VoiceResponse::new());
        };
        let Some(config) = tx.phone_number_config(progress.phone_number_config_id).await? else {
            return Ok(VoiceResponse::new());
        };

        Ok(match config.whisper() {
            Some(message) => {
                let (voice, language) = self.voice(&config);
                VoiceResponse::new().say(
                    variables::substitute(message, &progress.variables.0),
                    Some(voice),
                    Some(language),
                )
            }
            None => VoiceResponse::new(),
        })
    }

    /// An agent leg joining the caller's conference
    pub async fn agent_join(&self, parent_call_sid: &str) -> VoiceResponse {
        if let Err(e) = self.try_agent_join(parent_call_sid).await {
            tracing::error!("Agent join for {} could not update progress: {}", parent_call_sid, e);
        }
        VoiceResponse::new().dial(Dial::conference(parent_call_sid, false))
    }

    async fn try_agent_join(&self, parent_call_sid: &str) -> StoreResult<()> {
        let mut tx = self.store.begin().await?;
        if let Some(mut progress) = tx.ivr_progress(parent_call_sid).await? {
            progress.advance(IvrStage::ConversionKeypad, Utc::now());
            tx.save_ivr_progress(&progress).await?;
            tx.commit().await?;
        }
        Ok(())
    }

    /// Post-connect conversion digits: recorded in the log only
    pub async fn conversion_collect(&self, call_sid: &str, digits: Option<&str>) -> VoiceResponse {
        let call_id = match self.store.begin().await {
            Ok(mut tx) => tx.call_by_external_id(call_sid).await.ok().flatten().map(|c| c.id),
            Err(_) => None,
        };
        tracing::info!(
            "Conversion keypad input {:?} for call {} ({:?})",
            digits.unwrap_or_default(),
            call_sid,
            call_id
        );
        VoiceResponse::new()
    }

    /// Outcome of the forward leg
    pub async fn dial_ended(&self, call_sid: &str, dial_status: &str) -> VoiceResponse {
        match self.try_dial_ended(call_sid, dial_status).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Dial-ended for {} failed: {}", call_sid, e);
                VoiceResponse::new().hangup()
            }
        }
    }

    async fn try_dial_ended(&self, call_sid: &str, dial_status: &str) -> StoreResult<VoiceResponse> {
        let now = Utc::now();
        let connected = matches!(
            dial_status.trim().to_ascii_lowercase().as_str(),
            "answered" | "completed" | "in-progress"
        );
        let next = if connected {
            CallStatus::InProgress
        } else {
            CallStatus::from_provider(dial_status)
        };

        let mut tx = self.store.begin().await?;
        match tx.lock_call_by_external_id(call_sid).await? {
            Some(call) => {
                if tx.update_call_status(call.id, &next, now).await? {
                    tracing::info!("Call {} {} -> {}", call_sid, call.status, next);
                } else {
                    tracing::debug!("Call {} stays {} (dial status {})", call_sid, call.status, dial_status);
                }
            }
            None => tracing::warn!("Dial ended for unknown call {}", call_sid),
        }

        if connected {
            if let Some(mut progress) = tx.ivr_progress(call_sid).await? {
                progress.advance(IvrStage::InProgress, now);
                tx.save_ivr_progress(&progress).await?;
            }
        }
        tx.commit().await?;

        Ok(if connected {
            VoiceResponse::new().dial(Dial::conference(call_sid, true))
        } else {
            VoiceResponse::new().hangup()
        })
    }

    /// Queue the recording for download; the webhook returns immediately
    pub fn recording_available(&self, notice: RecordingNotice) -> VoiceResponse {
        if notice.recording_sid.is_empty() || notice.recording_url.is_empty() {
            tracing::warn!("Recording callback for {} without RecordingSid/RecordingUrl", notice.call_sid);
            return VoiceResponse::new();
        }

        tracing::info!("Recording {} available for call {}", notice.recording_sid, notice.call_sid);
        self.recordings.enqueue(RecordingJob {
            call_sid: notice.call_sid,
            recording_sid: notice.recording_sid,
            recording_url: notice.recording_url,
            duration_seconds: notice.duration_seconds,
            attempt: 0,
        });
        VoiceResponse::new()
    }

    /// Provider says the call is over
    pub async fn cleanup(&self, call_sid: &str, duration: Option<i32>) -> VoiceResponse {
        match self.try_cleanup(call_sid, duration).await {
            Ok(Some(event)) => events::publish(&self.events, event),
            Ok(None) => {}
            Err(e) => tracing::error!("Cleanup for {} failed: {}", call_sid, e),
        }
        VoiceResponse::new()
    }

    async fn try_cleanup(&self, call_sid: &str, duration: Option<i32>) -> StoreResult<Option<CallEvent>> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        tx.delete_ivr_progress(call_sid).await?;

        let Some(call) = tx.lock_call_by_external_id(call_sid).await? else {
            tracing::debug!("Cleanup for unknown call {}", call_sid);
            tx.commit().await?;
            return Ok(None);
        };

        if let Some(duration) = duration {
            tx.set_call_duration(call.id, duration.max(0), now).await?;
        }
        let finalized = call.status.finalized();
        let status = if tx.update_call_status(call.id, &finalized, now).await? {
            finalized
        } else {
            call.status.clone()
        };
        tx.commit().await?;

        tracing::info!("Call {} finished as {} after {:?}s", call_sid, status, duration);
        Ok(Some(CallEvent::Ended {
            call_id: call.id,
            external_id: call.external_id,
            status,
            duration: duration.or(call.duration),
        }))
    }

    fn voice<'a>(&'a self, config: &'a PhoneNumberConfig) -> (&'a str, &'a str) {
        (
            config.greeting_voice.as_deref().unwrap_or(&self.settings.default_voice),
            config.greeting_language.as_deref().unwrap_or(&self.settings.default_language),
        )
    }

    fn greeting(&self, config: &PhoneNumberConfig, vars: &BTreeMap<String, String>) -> VoiceResponse {
        let response = VoiceResponse::new();
        if !config.greeting_enabled {
            return response;
        }

        match config.greeting_message_type {
            Some(GreetingType::Audio) => match config.greeting_audio_url.as_deref().filter(|u| !u.is_empty()) {
                Some(url) => response.play(url),
                None => response,
            },
            _ => match config.greeting_message.as_deref().filter(|m| !m.trim().is_empty()) {
                Some(message) => {
                    let (voice, language) = self.voice(config);
                    response.say(variables::substitute(message, vars), Some(voice), Some(language))
                }
                None => response,
            },
        }
    }

    fn keypad_prompt(
        &self,
        response: VoiceResponse,
        config: &PhoneNumberConfig,
        vars: &BTreeMap<String, String>,
    ) -> VoiceResponse {
        let collect = self.settings.callback("incoming-call-collect");
        let prompt = config
            .keypad_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| variables::substitute(p, vars));
        let (voice, language) = self.voice(config);

        response
            .gather_digit(
                self.settings.keypad_timeout_seconds,
                collect.clone(),
                prompt.as_deref().map(|p| (p, Some(voice), Some(language))),
            )
            .redirect(collect)
    }

    /// Create (or reuse) the call row and forward the caller
    #[allow(clippy::too_many_arguments)]
    async fn dial(
        &self,
        tx: &mut dyn StoreTx,
        response: VoiceResponse,
        progress: &mut IvrProgress,
        config: &PhoneNumberConfig,
        number: &PhoneNumber,
        caller: &CallerDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<(VoiceResponse, Option<CallEvent>)> {
        let (call, event) = match tx.call_by_external_id(&progress.external_id).await? {
            Some(call) => {
                tracing::info!("Call {} already recorded, reusing row {}", call.external_id, call.id);
                (call, None)
            }
            None => {
                let resolution = resolve_call(tx, number, caller, now).await?;
                let call = tx
                    .insert_call(NewCall {
                        company_id: number.company_id,
                        phone_number_id: number.id,
                        keyword_tracking_pool_id: number.keyword_tracking_pool_id,
                        keyword_tracking_pool_session_id: resolution.session.as_ref().map(|s| s.id),
                        contact_id: resolution.contact.id,
                        external_id: progress.external_id.clone(),
                        direction: CallDirection::Inbound,
                        status: CallStatus::Ringing,
                        first_call: resolution.first_call,
                        attribution: resolution.attribution,
                        recording_enabled: config.recording_enabled,
                        transcription_enabled: config.transcribes(),
                        forwarded_to: config.forward_to(),
                        created_at: now,
                    })
                    .await?;
                tracing::info!(
                    "Call {} created as {} (source {}, first call {})",
                    call.external_id,
                    call.id,
                    call.attribution.source,
                    call.first_call
                );
                let event = CallEvent::Started {
                    call_id: call.id,
                    company_id: call.company_id,
                    external_id: call.external_id.clone(),
                    first_call: call.first_call,
                    attribution: call.attribution.clone(),
                };
                (call, Some(event))
            }
        };

        progress.call_id = Some(call.id);
        progress.advance(IvrStage::Dialing, now);
        tx.save_ivr_progress(progress).await?;

        let whisper_url = config
            .whisper()
            .map(|_| self.settings.callback("dialed-call-preconnect"));
        let recording_callback = config
            .recording_enabled
            .then(|| self.settings.callback("dialed-call-recording-available"));

        let dial = Dial::number(config.forward_to(), whisper_url)
            .answer_on_bridge()
            .action(self.settings.callback("dialed-call-ended"))
            .record(config.recording_enabled, recording_callback);

        Ok((response.dial(dial), event))
    }
}

/// Caller fields saved at entry, for callbacks that no longer carry them
fn caller_from_progress(progress: &IvrProgress) -> CallerDetails {
    CallerDetails {
        country_code: progress.caller_country_code.clone(),
        number: progress.caller_number.clone(),
        first_name: progress.variable("caller_first_name"),
        last_name: progress.variable("caller_last_name"),
        city: progress.variable("caller_city"),
        state: progress.variable("caller_state"),
        zip: progress.variable("caller_zip"),
        country: progress.variable("caller_country"),
    }
}
