//! Transactional store used by the call flow
//!
//! Every webhook runs its reads and writes inside one `StoreTx`. Postgres
//! backs it in production; tests use an in-memory implementation.

pub mod postgres;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One unit of work. Dropping without `commit` rolls everything back.
#[async_trait]
pub trait StoreTx: Send {
    async fn company(&mut self, id: i64) -> StoreResult<Option<Company>>;

    async fn phone_number_config(&mut self, id: i64) -> StoreResult<Option<PhoneNumberConfig>>;

    // Phone numbers
    async fn phone_number(&mut self, id: i64) -> StoreResult<Option<PhoneNumber>>;
    /// Live (not deleted) number by its E.164 parts
    async fn phone_number_by_number(
        &mut self,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<PhoneNumber>>;
    /// Active numbers of a pool in creation order
    async fn pool_numbers(&mut self, pool_id: i64) -> StoreResult<Vec<PhoneNumber>>;
    /// Active numbers of a company that are not in any pool
    async fn flat_numbers(&mut self, company_id: i64) -> StoreResult<Vec<PhoneNumber>>;
    async fn detach_from_pool(&mut self, phone_number_id: i64, pool_id: i64) -> StoreResult<bool>;

    // Pools
    async fn pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>>;
    /// Pool row locked for the rest of the transaction
    async fn lock_pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>>;
    async fn company_pools(&mut self, company_id: i64) -> StoreResult<Vec<KeywordTrackingPool>>;

    // Pool sessions
    async fn active_pool_sessions(
        &mut self,
        pool_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<KeywordTrackingPoolSession>>;
    /// The session most recently handed a number in this pool
    async fn last_assigned_session(&mut self, pool_id: i64) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    async fn identity_session(
        &mut self,
        pool_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    async fn insert_pool_session(&mut self, session: NewPoolSession) -> StoreResult<KeywordTrackingPoolSession>;
    async fn extend_pool_session(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Newest unexpired session on the number already claimed by the contact
    async fn claimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    /// Newest unexpired unclaimed session on the number carrying this guuid
    async fn unclaimed_session_for_guuid(
        &mut self,
        phone_number_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    async fn has_unclaimed_session(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<bool>;
    /// Claim one session if nobody has claimed it yet
    async fn claim_session(
        &mut self,
        session_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    /// Claim the newest unclaimed active session on the number, if any
    async fn claim_any_unclaimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>>;
    async fn end_unclaimed_sessions(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<u64>;

    // Contacts
    async fn contact_by_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<Contact>>;
    async fn insert_contact(&mut self, contact: NewContact) -> StoreResult<Contact>;
    async fn set_contact_uuid(&mut self, contact_id: i64, uuid: Uuid) -> StoreResult<()>;

    // Calls
    async fn call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>>;
    /// Call row locked for the rest of the transaction
    async fn lock_call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>>;
    async fn contact_has_calls(&mut self, contact_id: i64) -> StoreResult<bool>;
    async fn insert_call(&mut self, call: NewCall) -> StoreResult<Call>;
    /// Forward-only; false when the stored status is terminal or ahead
    async fn update_call_status(&mut self, id: i64, status: &CallStatus, now: DateTime<Utc>) -> StoreResult<bool>;
    async fn set_call_duration(&mut self, id: i64, duration: i32, now: DateTime<Utc>) -> StoreResult<()>;

    // Block list
    async fn blocked_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<BlockedPhoneNumber>>;
    async fn insert_blocked_call(&mut self, blocked: NewBlockedCall) -> StoreResult<BlockedCall>;

    // Recordings
    async fn recording_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<CallRecording>>;
    async fn insert_recording(&mut self, recording: NewCallRecording) -> StoreResult<CallRecording>;

    // IVR progress
    async fn ivr_progress(&mut self, external_id: &str) -> StoreResult<Option<IvrProgress>>;
    async fn save_ivr_progress(&mut self, progress: &IvrProgress) -> StoreResult<()>;
    async fn delete_ivr_progress(&mut self, external_id: &str) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
