//! Postgres-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::models::*;
use crate::server::db;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn company(&mut self, id: i64) -> StoreResult<Option<Company>> {
        Ok(db::companies::get_by_id(&mut self.tx, id).await?)
    }

    async fn phone_number_config(&mut self, id: i64) -> StoreResult<Option<PhoneNumberConfig>> {
        Ok(db::configs::get_by_id(&mut self.tx, id).await?)
    }

    async fn phone_number(&mut self, id: i64) -> StoreResult<Option<PhoneNumber>> {
        Ok(db::phone_numbers::get_by_id(&mut self.tx, id).await?)
    }

    async fn phone_number_by_number(
        &mut self,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<PhoneNumber>> {
        Ok(db::phone_numbers::get_by_number(&mut self.tx, country_code, number).await?)
    }

    async fn pool_numbers(&mut self, pool_id: i64) -> StoreResult<Vec<PhoneNumber>> {
        Ok(db::phone_numbers::list_by_pool(&mut self.tx, pool_id).await?)
    }

    async fn flat_numbers(&mut self, company_id: i64) -> StoreResult<Vec<PhoneNumber>> {
        Ok(db::phone_numbers::list_flat_by_company(&mut self.tx, company_id).await?)
    }

    async fn detach_from_pool(&mut self, phone_number_id: i64, pool_id: i64) -> StoreResult<bool> {
        Ok(db::phone_numbers::detach_from_pool(&mut self.tx, phone_number_id, pool_id).await?)
    }

    async fn pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>> {
        Ok(db::pools::get_by_id(&mut self.tx, id).await?)
    }

    async fn lock_pool(&mut self, id: i64) -> StoreResult<Option<KeywordTrackingPool>> {
        Ok(db::pools::lock(&mut self.tx, id).await?)
    }

    async fn company_pools(&mut self, company_id: i64) -> StoreResult<Vec<KeywordTrackingPool>> {
        Ok(db::pools::list_enabled_by_company(&mut self.tx, company_id).await?)
    }

    async fn active_pool_sessions(
        &mut self,
        pool_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<KeywordTrackingPoolSession>> {
        Ok(db::sessions::list_active_by_pool(&mut self.tx, pool_id, now).await?)
    }

    async fn last_assigned_session(&mut self, pool_id: i64) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::get_last_assigned(&mut self.tx, pool_id).await?)
    }

    async fn identity_session(
        &mut self,
        pool_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::get_for_identity(&mut self.tx, pool_id, guuid, now).await?)
    }

    async fn insert_pool_session(&mut self, session: NewPoolSession) -> StoreResult<KeywordTrackingPoolSession> {
        Ok(db::sessions::create(&mut self.tx, session).await?)
    }

    async fn extend_pool_session(
        &mut self,
        id: i64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(db::sessions::extend(&mut self.tx, id, now, expires_at).await?)
    }

    async fn claimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::get_claimed_by_contact(&mut self.tx, phone_number_id, contact_id, now).await?)
    }

    async fn unclaimed_session_for_guuid(
        &mut self,
        phone_number_id: i64,
        guuid: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::get_unclaimed_for_guuid(&mut self.tx, phone_number_id, guuid, now).await?)
    }

    async fn has_unclaimed_session(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(db::sessions::has_unclaimed(&mut self.tx, phone_number_id, now).await?)
    }

    async fn claim_session(
        &mut self,
        session_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::claim(&mut self.tx, session_id, contact_id, now).await?)
    }

    async fn claim_any_unclaimed_session(
        &mut self,
        phone_number_id: i64,
        contact_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<KeywordTrackingPoolSession>> {
        Ok(db::sessions::claim_any_unclaimed(&mut self.tx, phone_number_id, contact_id, now).await?)
    }

    async fn end_unclaimed_sessions(&mut self, phone_number_id: i64, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(db::sessions::end_unclaimed(&mut self.tx, phone_number_id, now).await?)
    }

    async fn contact_by_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<Contact>> {
        Ok(db::contacts::get_by_number(&mut self.tx, company_id, country_code, number).await?)
    }

    async fn insert_contact(&mut self, contact: NewContact) -> StoreResult<Contact> {
        Ok(db::contacts::create(&mut self.tx, contact).await?)
    }

    async fn set_contact_uuid(&mut self, contact_id: i64, uuid: Uuid) -> StoreResult<()> {
        Ok(db::contacts::set_uuid(&mut self.tx, contact_id, uuid).await?)
    }

    async fn call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>> {
        Ok(db::calls::get_by_external_id(&mut self.tx, external_id).await?)
    }

    async fn lock_call_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<Call>> {
        Ok(db::calls::lock_by_external_id(&mut self.tx, external_id).await?)
    }

    async fn contact_has_calls(&mut self, contact_id: i64) -> StoreResult<bool> {
        Ok(db::calls::exists_for_contact(&mut self.tx, contact_id).await?)
    }

    async fn insert_call(&mut self, call: NewCall) -> StoreResult<Call> {
        Ok(db::calls::create(&mut self.tx, call).await?)
    }

    async fn update_call_status(&mut self, id: i64, status: &CallStatus, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(db::calls::update_status(&mut self.tx, id, status, now).await?)
    }

    async fn set_call_duration(&mut self, id: i64, duration: i32, now: DateTime<Utc>) -> StoreResult<()> {
        Ok(db::calls::set_duration(&mut self.tx, id, duration, now).await?)
    }

    async fn blocked_number(
        &mut self,
        company_id: i64,
        country_code: &str,
        number: &str,
    ) -> StoreResult<Option<BlockedPhoneNumber>> {
        Ok(db::blocked::get_by_number(&mut self.tx, company_id, country_code, number).await?)
    }

    async fn insert_blocked_call(&mut self, blocked: NewBlockedCall) -> StoreResult<BlockedCall> {
        Ok(db::blocked::create_call(&mut self.tx, blocked).await?)
    }

    async fn recording_by_external_id(&mut self, external_id: &str) -> StoreResult<Option<CallRecording>> {
        Ok(db::recordings::get_by_external_id(&mut self.tx, external_id).await?)
    }

    async fn insert_recording(&mut self, recording: NewCallRecording) -> StoreResult<CallRecording> {
        Ok(db::recordings::create(&mut self.tx, recording).await?)
    }

    async fn ivr_progress(&mut self, external_id: &str) -> StoreResult<Option<IvrProgress>> {
        Ok(db::ivr_progress::get(&mut self.tx, external_id).await?)
    }

    async fn save_ivr_progress(&mut self, progress: &IvrProgress) -> StoreResult<()> {
        Ok(db::ivr_progress::upsert(&mut self.tx, progress).await?)
    }

    async fn delete_ivr_progress(&mut self, external_id: &str) -> StoreResult<()> {
        Ok(db::ivr_progress::delete(&mut self.tx, external_id).await?)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
