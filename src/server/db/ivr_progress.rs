//! Server-side IVR progress, one row per live provider call

use sqlx::PgConnection;

use crate::models::IvrProgress;

pub async fn get(conn: &mut PgConnection, external_id: &str) -> Result<Option<IvrProgress>, sqlx::Error> {
    sqlx::query_as::<_, IvrProgress>(
        r#"
        SELECT external_id, company_id, phone_number_id, phone_number_config_id,
               caller_country_code, caller_number, stage, failed_attempts, variables, call_id, created_at, updated_at
        FROM ivr_progress
        WHERE external_id = $1
        "#
    )
    .bind(external_id)
    .fetch_optional(conn)
    .await
}

pub async fn upsert(conn: &mut PgConnection, progress: &IvrProgress) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ivr_progress (external_id, company_id, phone_number_id, phone_number_config_id,
                                  caller_country_code, caller_number, stage, failed_attempts,
                                  variables, call_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (external_id) DO UPDATE
        SET stage = EXCLUDED.stage,
            failed_attempts = EXCLUDED.failed_attempts,
            variables = EXCLUDED.variables,
            call_id = EXCLUDED.call_id,
            updated_at = EXCLUDED.updated_at
        "#
    )
    .bind(&progress.external_id)
    .bind(progress.company_id)
    .bind(progress.phone_number_id)
    .bind(progress.phone_number_config_id)
    .bind(&progress.caller_country_code)
    .bind(&progress.caller_number)
    .bind(progress.stage)
    .bind(progress.failed_attempts)
    .bind(&progress.variables)
    .bind(progress.call_id)
    .bind(progress.created_at)
    .bind(progress.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn delete(conn: &mut PgConnection, external_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM ivr_progress WHERE external_id = $1")
        .bind(external_id)
        .execute(conn)
        .await?;
    Ok(())
}
