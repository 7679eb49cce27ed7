//! Block list lookups and the audit trail of rejected attempts

use sqlx::PgConnection;

use crate::models::{BlockedCall, BlockedPhoneNumber, NewBlockedCall};

pub async fn get_by_number(
    conn: &mut PgConnection,
    company_id: i64,
    country_code: &str,
    number: &str,
) -> Result<Option<BlockedPhoneNumber>, sqlx::Error> {
    sqlx::query_as::<_, BlockedPhoneNumber>(
        r#"
        SELECT id, company_id, country_code, number, name, created_at
        FROM blocked_phone_numbers
        WHERE company_id = $1 AND country_code = $2 AND number = $3
        ORDER BY id ASC
        LIMIT 1
        "#
    )
    .bind(company_id)
    .bind(country_code)
    .bind(number)
    .fetch_optional(conn)
    .await
}

pub async fn create_call(conn: &mut PgConnection, blocked: NewBlockedCall) -> Result<BlockedCall, sqlx::Error> {
    sqlx::query_as::<_, BlockedCall>(
        r#"
        INSERT INTO blocked_calls (blocked_phone_number_id, company_id, phone_number_id, external_id, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, blocked_phone_number_id, company_id, phone_number_id, external_id, created_at
        "#
    )
    .bind(blocked.blocked_phone_number_id)
    .bind(blocked.company_id)
    .bind(blocked.phone_number_id)
    .bind(&blocked.external_id)
    .bind(blocked.created_at)
    .fetch_one(conn)
    .await
}
