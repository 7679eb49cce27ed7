//! Phone number database operations

use sqlx::PgConnection;
use crate::models::PhoneNumber;

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<PhoneNumber>, sqlx::Error> {
    sqlx::query_as::<_, PhoneNumber>(
        r#"
        SELECT id, company_id, phone_number_config_id, keyword_tracking_pool_id,
               country_code, number, name, source, medium, content, campaign,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               swap_rules, disabled_at, deleted_at, created_at
        FROM phone_numbers
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Numbers are unique among rows that are not deleted
pub async fn get_by_number(
    conn: &mut PgConnection,
    country_code: &str,
    number: &str,
) -> Result<Option<PhoneNumber>, sqlx::Error> {
    sqlx::query_as::<_, PhoneNumber>(
        r#"
        SELECT id, company_id, phone_number_config_id, keyword_tracking_pool_id,
               country_code, number, name, source, medium, content, campaign,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               swap_rules, disabled_at, deleted_at, created_at
        FROM phone_numbers
        WHERE country_code = $1 AND number = $2 AND deleted_at IS NULL
        "#
    )
    .bind(country_code)
    .bind(number)
    .fetch_optional(conn)
    .await
}

pub async fn list_by_pool(conn: &mut PgConnection, pool_id: i64) -> Result<Vec<PhoneNumber>, sqlx::Error> {
    sqlx::query_as::<_, PhoneNumber>(
        r#"
        SELECT id, company_id, phone_number_config_id, keyword_tracking_pool_id,
               country_code, number, name, source, medium, content, campaign,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               swap_rules, disabled_at, deleted_at, created_at
        FROM phone_numbers
        WHERE keyword_tracking_pool_id = $1
          AND disabled_at IS NULL
          AND deleted_at IS NULL
        ORDER BY created_at ASC, id ASC
        "#
    )
    .bind(pool_id)
    .fetch_all(conn)
    .await
}

pub async fn list_flat_by_company(conn: &mut PgConnection, company_id: i64) -> Result<Vec<PhoneNumber>, sqlx::Error> {
    sqlx::query_as::<_, PhoneNumber>(
        r#"
        SELECT id, company_id, phone_number_config_id, keyword_tracking_pool_id,
               country_code, number, name, source, medium, content, campaign,
               is_organic, is_paid, is_direct, is_referral, is_remarketing, is_search,
               swap_rules, disabled_at, deleted_at, created_at
        FROM phone_numbers
        WHERE company_id = $1
          AND keyword_tracking_pool_id IS NULL
          AND disabled_at IS NULL
          AND deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        "#
    )
    .bind(company_id)
    .fetch_all(conn)
    .await
}

/// Take a number out of its pool. Returns false if it was not in that pool.
pub async fn detach_from_pool(conn: &mut PgConnection, id: i64, pool_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE phone_numbers SET keyword_tracking_pool_id = NULL WHERE id = $1 AND keyword_tracking_pool_id = $2"
    )
    .bind(id)
    .bind(pool_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
