//! Keyword tracking pool database operations

use sqlx::PgConnection;
use crate::models::KeywordTrackingPool;

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<KeywordTrackingPool>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPool>(
        r#"
        SELECT id, company_id, phone_number_config_id, name, swap_rules,
               session_ttl_seconds, disabled_at, created_at
        FROM keyword_tracking_pools
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Lock the pool row so concurrent allocations in the pool serialize
pub async fn lock(conn: &mut PgConnection, id: i64) -> Result<Option<KeywordTrackingPool>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPool>(
        r#"
        SELECT id, company_id, phone_number_config_id, name, swap_rules,
               session_ttl_seconds, disabled_at, created_at
        FROM keyword_tracking_pools
        WHERE id = $1
        FOR UPDATE
        "#
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

pub async fn list_enabled_by_company(
    conn: &mut PgConnection,
    company_id: i64,
) -> Result<Vec<KeywordTrackingPool>, sqlx::Error> {
    sqlx::query_as::<_, KeywordTrackingPool>(
        r#"
        SELECT id, company_id, phone_number_config_id, name, swap_rules,
               session_ttl_seconds, disabled_at, created_at
        FROM keyword_tracking_pools
        WHERE company_id = $1 AND disabled_at IS NULL
        ORDER BY created_at ASC, id ASC
        "#
    )
    .bind(company_id)
    .fetch_all(conn)
    .await
}
