//! Company lookups

use sqlx::PgConnection;
use crate::models::Company;

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Company>, sqlx::Error> {
    sqlx::query_as::<_, Company>(
        r#"
        SELECT id, account_id, name, disabled_at, created_at
        FROM companies
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}
