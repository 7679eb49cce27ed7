//! Keyword tracking pool session operations
//!
//! Claims are conditional updates: a session is only ever claimed while its
//! contact_id is still NULL, so two calls racing for it cannot both win.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{KeywordTrackingPoolSession, NewPoolSession};

pub async fn list_active_by_pool(
    conn: &mut PgConnection,
    pool_id: i64,
    now: DateTime<Utc>,
) -> Result<Vec<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        SELECT id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
               device_type, browser_type, landing_url, http_referrer,
               source, medium, content, campaign, keyword,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               created_at, last_activity_at, expires_at, claimed_at, ended_at
        FROM keyword_tracking_pool_sessions
        WHERE keyword_tracking_pool_id = $1
          AND ended_at IS NULL
          AND expires_at > $2
        ORDER BY created_at ASC, id ASC
        "#
    )
    .bind(pool_id)
    .bind(now)
    .fetch_all(conn)
    .await
}

pub async fn get_last_assigned(
    conn: &mut PgConnection,
    pool_id: i64,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        SELECT id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
               device_type, browser_type, landing_url, http_referrer,
               source, medium, content, campaign, keyword,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               created_at, last_activity_at, expires_at, claimed_at, ended_at
        FROM keyword_tracking_pool_sessions
        WHERE keyword_tracking_pool_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    )
    .bind(pool_id)
    .fetch_optional(conn)
    .await
}

pub async fn get_for_identity(
    conn: &mut PgConnection,
    pool_id: i64,
    guuid: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        SELECT id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
               device_type, browser_type, landing_url, http_referrer,
               source, medium, content, campaign, keyword,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               created_at, last_activity_at, expires_at, claimed_at, ended_at
        FROM keyword_tracking_pool_sessions
        WHERE keyword_tracking_pool_id = $1
          AND guuid = $2
          AND ended_at IS NULL
          AND expires_at > $3
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    )
    .bind(pool_id)
    .bind(guuid)
    .bind(now)
    .fetch_optional(conn)
    .await
}

pub async fn create(
    conn: &mut PgConnection,
    session: NewPoolSession,
) -> Result<KeywordTrackingPoolSession, sqlx::Error> {
    let a = &session.attribution;
    let c = &a.classification;
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        INSERT INTO keyword_tracking_pool_sessions (
            keyword_tracking_pool_id, phone_number_id, guuid,
            device_type, browser_type, landing_url, http_referrer,
            source, medium, content, campaign, keyword,
            is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
            created_at, last_activity_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $19, $20)
        RETURNING id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
                  device_type, browser_type, landing_url, http_referrer,
                  source, medium, content, campaign, keyword,
                  is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
                  created_at, last_activity_at, expires_at, claimed_at, ended_at
        "#
    )
    .bind(session.keyword_tracking_pool_id)
    .bind(session.phone_number_id)
    .bind(session.guuid)
    .bind(&session.device_type)
    .bind(&session.browser_type)
    .bind(&session.landing_url)
    .bind(&session.http_referrer)
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
    .bind(session.created_at)
    .bind(session.expires_at)
    .fetch_one(conn)
    .await
}

pub async fn extend(
    conn: &mut PgConnection,
    id: i64,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE keyword_tracking_pool_sessions SET last_activity_at = $2, expires_at = $3 WHERE id = $1")
        .bind(id)
        .bind(now)
        .bind(expires_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn get_claimed_by_contact(
    conn: &mut PgConnection,
    phone_number_id: i64,
    contact_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        SELECT id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
               device_type, browser_type, landing_url, http_referrer,
               source, medium, content, campaign, keyword,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               created_at, last_activity_at, expires_at, claimed_at, ended_at
        FROM keyword_tracking_pool_sessions
        WHERE phone_number_id = $1
          AND contact_id = $2
          AND ended_at IS NULL
          AND expires_at > $3
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    )
    .bind(phone_number_id)
    .bind(contact_id)
    .bind(now)
    .fetch_optional(conn)
    .await
}

pub async fn get_unclaimed_for_guuid(
    conn: &mut PgConnection,
    phone_number_id: i64,
    guuid: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        SELECT id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
               device_type, browser_type, landing_url, http_referrer,
               source, medium, content, campaign, keyword,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               created_at, last_activity_at, expires_at, claimed_at, ended_at
        FROM keyword_tracking_pool_sessions
        WHERE phone_number_id = $1
          AND guuid = $2
          AND contact_id IS NULL
          AND ended_at IS NULL
          AND expires_at > $3
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    )
    .bind(phone_number_id)
    .bind(guuid)
    .bind(now)
    .fetch_optional(conn)
    .await
}

pub async fn has_unclaimed(
    conn: &mut PgConnection,
    phone_number_id: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM keyword_tracking_pool_sessions
            WHERE phone_number_id = $1
              AND contact_id IS NULL
              AND ended_at IS NULL
              AND expires_at > $2
        )
        "#
    )
    .bind(phone_number_id)
    .bind(now)
    .fetch_one(conn)
    .await
}

pub async fn claim(
    conn: &mut PgConnection,
    id: i64,
    contact_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        UPDATE keyword_tracking_pool_sessions
        SET contact_id = $2, claimed_at = $3, last_activity_at = $3
        WHERE id = $1
          AND contact_id IS NULL
          AND ended_at IS NULL
          AND expires_at > $3
        RETURNING id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
                  device_type, browser_type, landing_url, http_referrer,
                  source, medium, content, campaign, keyword,
                  is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
                  created_at, last_activity_at, expires_at, claimed_at, ended_at
        "#
    )
    .bind(id)
    .bind(contact_id)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Claim the most recently active unclaimed session on the number.
/// Rows locked by a concurrent claim are skipped rather than waited on.
pub async fn claim_any_unclaimed(
    conn: &mut PgConnection,
    phone_number_id: i64,
    contact_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<KeywordTrackingPoolSession>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPoolSession>(
        r#"
        UPDATE keyword_tracking_pool_sessions
        SET contact_id = $2, claimed_at = $3, last_activity_at = $3
        WHERE id = (
            SELECT id FROM keyword_tracking_pool_sessions
            WHERE phone_number_id = $1
              AND contact_id IS NULL
              AND ended_at IS NULL
              AND expires_at > $3
            ORDER BY last_activity_at DESC, id DESC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, keyword_tracking_pool_id, phone_number_id, guuid, contact_id,
                  device_type, browser_type, landing_url, http_referrer,
                  source, medium, content, campaign, keyword,
                  is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
                  created_at, last_activity_at, expires_at, claimed_at, ended_at
        "#
    )
    .bind(phone_number_id)
    .bind(contact_id)
    .bind(now)
    .fetch_optional(conn)
    .await
}

/// Orphan pending sessions of a retired number; claimed ones run out on their own
pub async fn end_unclaimed(
    conn: &mut PgConnection,
    phone_number_id: i64,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE keyword_tracking_pool_sessions
        SET ended_at = $2
        WHERE phone_number_id = $1
          AND contact_id IS NULL
          AND ended_at IS NULL
        "#
    )
    .bind(phone_number_id)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
