//! Call recording database operations

use sqlx::PgConnection;

use crate::models::{CallRecording, NewCallRecording};

pub async fn get_by_external_id(
    conn: &mut PgConnection,
    external_id: &str,
) -> Result<Option<CallRecording>, sqlx::Error> {
    sqlx::query_as::<_, CallRecording>(
        r#"
        SELECT id, call_id, external_id, path, duration_seconds, file_size,
               transcription_path, created_at
        FROM call_recordings
        WHERE external_id = $1
        "#
    )
    .bind(external_id)
    .fetch_optional(conn)
    .await
}

pub async fn create(conn: &mut PgConnection, recording: NewCallRecording) -> Result<CallRecording, sqlx::Error> {
    sqlx::query_as::<_, CallRecording>(
        r#"
        INSERT INTO call_recordings (call_id, external_id, path, duration_seconds, file_size,
                                     transcription_path, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, call_id, external_id, path, duration_seconds, file_size,
                  transcription_path, created_at
        "#
    )
    .bind(recording.call_id)
    .bind(&recording.external_id)
    .bind(&recording.path)
    .bind(recording.duration_seconds)
    .bind(recording.file_size)
    .bind(&recording.transcription_path)
    .bind(recording.created_at)
    .fetch_one(conn)
    .await
}
