//! In-memory store for tests
//!
//! A transaction holds the state lock for its whole life and works on a
//! copy, which is written back on commit. Transactions therefore serialize
//! the way pool-row locks do in Postgres.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::models::*;

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub companies: Vec<Company>,
    pub configs: Vec<PhoneNumberConfig>,
    pub phone_numbers: Vec<PhoneNumber>,
    pub pools: Vec<KeywordTrackingPool>,
    pub sessions: Vec<KeywordTrackingPoolSession>,
    pub contacts: Vec<Contact>,
    pub calls: Vec<Call>,
    pub blocked_numbers: Vec<BlockedPhoneNumber>,
    pub blocked_calls: Vec<BlockedCall>,
    pub recordings: Vec<CallRecording>,
    pub progress: Vec<IvrProgress>,
    next_id: i64,
}

impl MemoryState {
    pub fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_company(&mut self, name: &str) -> Company {
        let company = Company {
            id: self.next_id(),
            account_id: 1,
            name: name.to_string(),
            disabled_at: None,
            created_at: Utc::now(),
        };
        self.companies.push(company.clone());
        company
    }

    /// Plain forwarding config; tests switch features on by editing the result
    pub fn add_config(&mut self, company_id: i64, forward_to: &str) -> PhoneNumberConfig {
        let config = PhoneNumberConfig {
            id: self.next_id(),
            company_id,
            name: "Main line".to_string(),
            forward_to_country_code: "1".to_string(),
            forward_to_number: forward_to.to_string(),
            greeting_enabled: false,
            greeting_message_type: None,
            greeting_message: None,
            greeting_audio_url: None,
            greeting_voice: None,
            greeting_language: None,
            keypad_enabled: false,
            keypad_answer: None,
            keypad_attempts: 0,
            keypad_prompt: None,
            keypad_failure_message: None,
            whisper_enabled: false,
            whisper_message: None,
            recording_enabled: false,
            transcription_enabled: false,
            created_at: Utc::now(),
        };
        self.configs.push(config.clone());
        config
    }

    pub fn update_config(&mut self, config: PhoneNumberConfig) {
        if let Some(existing) = self.configs.iter_mut().find(|c| c.id == config.id) {
            *existing = config;
        }
    }

    pub fn add_pool(&mut self, company_id: i64, config_id: i64, swap_rules: serde_json::Value) -> KeywordTrackingPool {
        let pool = KeywordTrackingPool {
            id: self.next_id(),
            company_id,
            phone_number_config_id: config_id,
            name: "Keyword pool".to_string(),
            swap_rules: Some(swap_rules),
            session_ttl_seconds: KeywordTrackingPool::DEFAULT_SESSION_TTL_SECONDS,
            disabled_at: None,
            created_at: Utc::now(),
        };
        self.pools.push(pool.clone());
        pool
    }

    /// Number in creation order `age_rank` (higher is newer)
    pub fn add_number(
        &mut self,
        company_id: i64,
        config_id: Option<i64>,
        pool_id: Option<i64>,
        number: &str,
        age_rank: i64,
    ) -> PhoneNumber {
        let phone_number = PhoneNumber {
            id: self.next_id(),
            company_id,
            phone_number_config_id: config_id,
            keyword_tracking_pool_id: pool_id,
            country_code: "1".to_string(),
            number: number.to_string(),
            name: format!("Tracking {}", number),
            source: "Website".to_string(),
            medium: None,
            content: None,
            campaign: None,
            classification: Classification::default(),
            swap_rules: None,
            disabled_at: None,
            deleted_at: None,
            created_at: Utc::now() - chrono::Duration::days(365) + chrono::Duration::minutes(age_rank),
        };
        self.phone_numbers.push(phone_number.clone());
        phone_number
    }

    pub fn update_number(&mut self, phone_number: PhoneNumber) {
        if let Some(existing) = self.phone_numbers.iter_mut().find(|n| n.id == phone_number.id) {
            *existing = phone_number;
        }
    }

    pub fn add_contact(&mut self, company_id: i64, number: &str, uuid: Uuid) -> Contact {
        let contact = Contact {
            id: self.next_id(),
            company_id,
            uuid,
            country_code: "1".to_string(),
            number: number.to_string(),
            first_name: None,
            last_name: None,
            city: None,
            state: None,
            zip: None,
            country: None,
            created_at: Utc::now(),
        };
        self.contacts.push(contact.clone());
        contact
    }

    pub fn add_session(
        &mut self,
        pool_id: i64,
        phone_number_id: i64,
        guuid: Uuid,
        attribution: AttributionSnapshot,
        created_at: DateTime<Utc>,
    ) -> KeywordTrackingPoolSession {
        let session = KeywordTrackingPoolSession {
            id: self.next_id(),
            keyword_tracking_pool_id: pool_id,
            phone_number_id,
            guuid,
            contact_id: None,
            device_type: Some("DESKTOP".to_string()),
            browser_type: Some("CHROME".to_string()),
            landing_url: None,
            http_referrer: None,
            attribution,
            created_at,
            last_activity_at: created_at,
            expires_at: created_at + chrono::Duration::seconds(KeywordTrackingPool::DEFAULT_SESSION_TTL_SECONDS),
            claimed_at: None,
            ended_at: None,
        };
        self.sessions.push(session.clone());
        session
    }

    pub fn add_blocked(&mut self, company_id: i64, number: &str) -> BlockedPhoneNumber {
        let blocked = BlockedPhoneNumber {
            id: self.next_id(),
            company_id,
            country_code: "1".to_string(),
            number: number.to_string(),
            name: Some("Spam".to_string()),
            created_at: Utc::now(),
        };
        self.blocked_numbers.push(blocked.clone());
        blocked
    }

    pub fn session(&self, id: i64) -> Option<&KeywordTrackingPoolSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn call(&self, external_id: &str) -> Option<&Call> {
        self.calls.iter().find(|c| c.external_id == external_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the committed state directly, for seeding fixtures
    pub async fn seed<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut MemoryState) -> R,
    {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn newest<'a, I>(sessions: I) -> Option<&'a KeywordTrackingPoolSession>
where
    I: Iterator<Item = &'a KeywordTrackingPoolSession>,
{
    sessions.max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

fn unclaimed(s: &KeywordTrackingPoolSession, phone_number_id: i64, now: DateTime<Utc>) -> bool {
    s.phone_number_id == phone_number_id && s.contact_id.is_none() && s.is_active(now)
}

impl MemoryTx {
    fn claim_by_id(&mut self, id: i64, contact_id: i64, now: DateTime<Utc>) -> Option<KeywordTrackingPoolSession> {
        let session = self
            .working
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.contact_id.is_none() && s.is_active(now))?;
        session.contact_id = Some(contact_id);
        session.claimed_at = Some(now);
        session.last_activity_at = now;
        Some(session.clone())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn company(&mut self, id: i64) -> StoreResult<Option<Company>> {
        Ok(self.working.companies.iter().find(|c| c.id == id).cloned())
    }

    async fn phone_number_config(&mut self, id: i64) -> StoreResult<Option<PhoneNumberConfig>> {
        Ok(self.working.configs.iter().find(|c| c.id == id).cloned())
    }

    async fn phone_number(&mut self, id: i64) -> StoreResult<Option<PhoneNumber>> {
        Ok(self.working.phone_numbers.iter().find(|n| n.id == id).cloned())
    }

    async fn phone_number_by_number(
        &mut self,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<PhoneNumber>> {
        Ok(self
            .working
            .phone_numbers
            .iter()
            .find(|n| n.country_code == country_code && n.number == number && n.deleted_at.is_none())
            .cloned())
    }

    async fn pool_numbers(&mut self, pool_id: i64) -> StoreResult<Vec<PhoneNumber>> {
        let mut numbers: Vec<PhoneNumber> = self
            .working
            .phone_numbers
            .iter()
            .filter(|n| n.keyword_tracking_pool_id == Some(pool_id) && n.is_active())
            .cloned()
            .collect();
        numbers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(numbers)
    }

    async fn flat_numbers(&mut self, company_id: i64) -> StoreResult<Vec<PhoneNumber>> {
        let mut numbers: Vec<PhoneNumber> = self
            .working
            .phone_numbers
            .iter()
            .filter(|n| n.company_id == company_id && !n.is_pool_number() && n.is_active())
            .cloned()
            .collect();
        numbers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(numbers)
    }

    async fn detach_from_pool(&mut self, phone_number_id: i64, pool_id: i64) -> StoreResult<bool> {
        match self
            .working
            .phone_numbers
            .iter_mut()
            .find(|n| n.id == phone_number_id && n.keyword_tracking_pool_id == Some(pool_id))
        {
            Some(number) => {
                number.keyword_tracking_pool_id = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>> {
        Ok(self.working.pools.iter().find(|p| p.id == id).cloned())
    }

    async fn lock_pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>> {
        self.pool(id).await
    }

    async fn company_pools(&mut self, company_id: i64) -> StoreResult<Vec<KeywordTrackingPool>> {
        let mut pools: Vec<KeywordTrackingPool> = self
            .working
            .pools
            .iter()
            .filter(|p| p.company_id == company_id && p.is_enabled())
            .cloned()
            .collect();
        pools.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pools)
    }

    async fn active_pool_sessions(
        &mut self,
        pool_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<KeywordTrackingPoolSession>> {
        Ok(self
            .working
            .sessions
            .iter()
            .filter(|s| s.keyword_tracking_pool_id == pool_id && s.is_active(now))
            .cloned()
            .collect())
    }

    async fn last_assigned_session(&mut self, pool_id: i64) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(newest(self.working.sessions.iter().filter(|s| s.keyword_tracking_pool_id == pool_id)).cloned())
    }

    async fn identity_session(
        &mut self,
        pool_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(newest(
            self.working
                .sessions
                .iter()
                .filter(|s| s.keyword_tracking_pool_id == pool_id && s.guuid == guuid && s.is_active(now)),
        )
        .cloned())
    }

    async fn insert_pool_session(&mut self, session: NewPoolSession) -> StoreResult<KeywordTrackingPoolSession> {
        let row = KeywordTrackingPoolSession {
            id: self.working.next_id(),
            keyword_tracking_pool_id: session.keyword_tracking_pool_id,
            phone_number_id: session.phone_number_id,
            guuid: session.guuid,
            contact_id: None,
            device_type: session.device_type,
            browser_type: session.browser_type,
            landing_url: session.landing_url,
            http_referrer: session.http_referrer,
            attribution: session.attribution,
            created_at: session.created_at,
            last_activity_at: session.created_at,
            expires_at: session.expires_at,
            claimed_at: None,
            ended_at: None,
        };
        self.working.sessions.push(row.clone());
        Ok(row)
    }

    async fn extend_pool_session(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if let Some(session) = self.working.sessions.iter_mut().find(|s| s.id == id) {
            session.last_activity_at = now;
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn claimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(newest(self.working.sessions.iter().filter(|s| {
            s.phone_number_id == phone_number_id && s.contact_id == Some(contact_id) && s.is_active(now)
        }))
        .cloned())
    }

    async fn unclaimed_session_for_guuid(
        &mut self,
        phone_number_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(newest(
            self.working
                .sessions
                .iter()
                .filter(|s| unclaimed(s, phone_number_id, now) && s.guuid == guuid),
        )
        .cloned())
    }

    async fn has_unclaimed_session(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.working.sessions.iter().any(|s| unclaimed(s, phone_number_id, now)))
    }

    async fn claim_session(
        &mut self,
        session_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(self.claim_by_id(session_id, contact_id, now))
    }

    async fn claim_any_unclaimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        let candidate = self
            .working
            .sessions
            .iter()
            .filter(|s| unclaimed(s, phone_number_id, now))
            .max_by(|a, b| a.last_activity_at.cmp(&b.last_activity_at).then(a.id.cmp(&b.id)))
            .map(|s| s.id);

        Ok(candidate.and_then(|id| self.claim_by_id(id, contact_id, now)))
    }

    async fn end_unclaimed_sessions(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut ended = 0;
        for session in self.working.sessions.iter_mut().filter(|s| {
            s.phone_number_id == phone_number_id && s.contact_id.is_none() && s.ended_at.is_none()
        }) {
            session.ended_at = Some(now);
            ended += 1;
        }
        Ok(ended)
    }

    async fn contact_by_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<Contact>> {
        Ok(self
            .working
            .contacts
            .iter()
            .find(|c| c.company_id == company_id && c.country_code == country_code && c.number == number)
            .cloned())
    }

    async fn insert_contact(&mut self, contact: NewContact) -> StoreResult<Contact> {
        if let Some(existing) = self
            .contact_by_number(contact.company_id, &contact.country_code, &contact.number)
            .await?
        {
            return Ok(existing);
        }

        let row = Contact {
            id: self.working.next_id(),
            company_id: contact.company_id,
            uuid: contact.uuid,
            country_code: contact.country_code,
            number: contact.number,
            first_name: contact.first_name,
            last_name: contact.last_name,
            city: contact.city,
            state: contact.state,
            zip: contact.zip,
            country: contact.country,
            created_at: contact.created_at,
        };
        self.working.contacts.push(row.clone());
        Ok(row)
    }

    async fn set_contact_uuid(&mut self, contact_id: i64, uuid: Uuid) -> StoreResult<()> {
        if let Some(contact) = self.working.contacts.iter_mut().find(|c| c.id == contact_id) {
            contact.uuid = uuid;
        }
        Ok(())
    }

    async fn call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>> {
        Ok(self.working.calls.iter().find(|c| c.external_id == external_id).cloned())
    }

    async fn lock_call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>> {
        self.call_by_external_id(external_id).await
    }

    async fn contact_has_calls(&mut self, contact_id: i64) -> StoreResult<bool> {
        Ok(self.working.calls.iter().any(|c| c.contact_id == contact_id))
    }

    async fn insert_call(&mut self, call: NewCall) -> StoreResult<Call> {
        let row = Call {
            id: self.working.next_id(),
            company_id: call.company_id,
            phone_number_id: call.phone_number_id,
            keyword_tracking_pool_id: call.keyword_tracking_pool_id,
            keyword_tracking_pool_session_id: call.keyword_tracking_pool_session_id,
            contact_id: call.contact_id,
            external_id: call.external_id,
            direction: call.direction,
            status: call.status,
            first_call: call.first_call,
            attribution: call.attribution,
            recording_enabled: call.recording_enabled,
            transcription_enabled: call.transcription_enabled,
            forwarded_to: call.forwarded_to,
            duration: None,
            created_at: call.created_at,
            updated_at: call.created_at,
        };
        self.working.calls.push(row.clone());
        Ok(row)
    }

    async fn update_call_status(&mut self, id: i64, status: &CallStatus, now: DateTime<Utc>) -> StoreResult<bool> {
        match self.working.calls.iter_mut().find(|c| c.id == id) {
            Some(call) if call.status != *status && call.status.can_advance_to(status) => {
                call.status = status.clone();
                call.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_call_duration(&mut self, id: i64, duration: i32, now: DateTime<Utc>) -> StoreResult<()> {
        if let Some(call) = self.working.calls.iter_mut().find(|c| c.id == id) {
            call.duration = Some(duration);
            call.updated_at = now;
        }
        Ok(())
    }

    async fn blocked_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<BlockedPhoneNumber>> {
        Ok(self
            .working
            .blocked_numbers
            .iter()
            .find(|b| b.company_id == company_id && b.country_code == country_code && b.number == number)
            .cloned())
    }

    async fn insert_blocked_call(&mut self, blocked: NewBlockedCall) -> StoreResult<BlockedCall> {
        let row = BlockedCall {
            id: self.working.next_id(),
            blocked_phone_number_id: blocked.blocked_phone_number_id,
            company_id: blocked.company_id,
            phone_number_id: blocked.phone_number_id,
            external_id: blocked.external_id,
            created_at: blocked.created_at,
        };
        self.working.blocked_calls.push(row.clone());
        Ok(row)
    }

    async fn recording_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<CallRecording>> {
        Ok(self.working.recordings.iter().find(|r| r.external_id == external_id).cloned())
    }

    async fn insert_recording(&mut self, recording: NewCallRecording) -> StoreResult<CallRecording> {
        let row = CallRecording {
            id: self.working.next_id(),
            call_id: recording.call_id,
            external_id: recording.external_id,
            path: recording.path,
            duration_seconds: recording.duration_seconds,
            file_size: recording.file_size,
            transcription_path: recording.transcription_path,
            created_at: recording.created_at,
        };
        self.working.recordings.push(row.clone());
        Ok(row)
    }

    async fn ivr_progress(&mut self, external_id: &str) -> StoreResult<Option<IvrProgress>> {
        Ok(self.working.progress.iter().find(|p| p.external_id == external_id).cloned())
    }

    async fn save_ivr_progress(&mut self, progress: &IvrProgress) -> StoreResult<()> {
        match self.working.progress.iter_mut().find(|p| p.external_id == progress.external_id) {
            Some(existing) => *existing = progress.clone(),
            None => self.working.progress.push(progress.clone()),
        }
        Ok(())
    }

    async fn delete_ivr_progress(&mut self, external_id: &str) -> StoreResult<()> {
        self.working.progress.retain(|p| p.external_id != external_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
