//! Call database operations

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::models::{Call, CallStatus, NewCall};

const CALL_COLUMNS: &str = r#"
    id, company_id, phone_number_id, keyword_tracking_pool_id,
    keyword_tracking_pool_session_id, contact_id, external_id,
    direction, status, first_call,
    source, medium, content, campaign, keyword,
    is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
    recording_enabled, transcription_enabled, forwarded_to, duration,
    created_at, updated_at
"#;

pub async fn get_by_external_id(conn: &mut PgConnection, external_id: &str) -> Result<Option<Call>, sqlx::Error> {
    sqlx::query_as::<_, Call>(&format!("SELECT {} FROM calls WHERE external_id = $1", CALL_COLUMNS))
        .bind(external_id)
        .fetch_optional(conn)
        .await
}

/// Same row, locked until the transaction ends so status decisions made
/// from it cannot race another callback for the same call
pub async fn lock_by_external_id(conn: &mut PgConnection, external_id: &str) -> Result<Option<Call>, sqlx::Error> {
    sqlx::query_as::<_, Call>(&format!(
        "SELECT {} FROM calls WHERE external_id = $1 FOR UPDATE",
        CALL_COLUMNS
    ))
    .bind(external_id)
    .fetch_optional(conn)
    .await
}

pub async fn exists_for_contact(conn: &mut PgConnection, contact_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM calls WHERE contact_id = $1)")
        .bind(contact_id)
        .fetch_one(conn)
        .await
}

pub async fn create(conn: &mut PgConnection, call: NewCall) -> Result<Call, sqlx::Error> {
    let a = &call.attribution;
    let c = &a.classification;
    sqlx::query_as::<_, Call>(
        r#"
        INSERT INTO calls (
            company_id, phone_number_id, keyword_tracking_pool_id,
            keyword_tracking_pool_session_id, contact_id, external_id,
            direction, status, first_call,
            source, medium, content, campaign, keyword,
            is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
            recording_enabled, transcription_enabled, forwarded_to,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $24)
        RETURNING id, company_id, phone_number_id, keyword_tracking_pool_id,
                  keyword_tracking_pool_session_id, contact_id, external_id,
                  direction, status, first_call,
                  source, medium, content, campaign, keyword,
                  is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
                  recording_enabled, transcription_enabled, forwarded_to, duration,
                  created_at, updated_at
        "#
    )
    .bind(call.company_id)
    .bind(call.phone_number_id)
    .bind(call.keyword_tracking_pool_id)
    .bind(call.keyword_tracking_pool_session_id)
    .bind(call.contact_id)
    .bind(&call.external_id)
    .bind(call.direction)
    .bind(call.status.as_str())
    .bind(call.first_call)
    .bind(&a.source)
    .bind(&a.medium)
    .bind(&a.content)
    .bind(&a.campaign)
    .bind(&a.keyword)
    .bind(c.is_organic)
    .bind(c.is_paid)
    .bind(c.is_direct)
    .bind(c.is_referral)
    .bind(c.is_remarketing)
    .bind(c.is_search)
    .bind(call.recording_enabled)
    .bind(call.transcription_enabled)
    .bind(&call.forwarded_to)
    .bind(call.created_at)
    .fetch_one(conn)
    .await
}

/// Move a call to `status` only if that is forward of what is stored.
/// Returns false when the row was terminal, ahead or already there.
pub async fn update_status(
    conn: &mut PgConnection,
    id: i64,
    status: &CallStatus,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE calls SET status = $2, updated_at = $3
        WHERE id = $1
          AND status <> $2
          AND status NOT IN ('Completed', 'Abandoned', 'Busy', 'Unanswered', 'Failed')
          AND (CASE status
                 WHEN 'Queued' THEN 0
                 WHEN 'Ringing' THEN 1
                 WHEN 'In Progress' THEN 3
                 ELSE 2
               END) <= $4
        "#
    )
    .bind(id)
    .bind(status.as_str())
    .bind(now)
    .bind(status.rank())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_duration(
    conn: &mut PgConnection,
    id: i64,
    duration: i32,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE calls SET duration = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(duration)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}
