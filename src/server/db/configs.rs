//! Phone number routing config lookups

use sqlx::PgConnection;
use crate::models::PhoneNumberConfig;

pub async fn get_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<PhoneNumberConfig>, sqlx::Error> {
    sqlx::query_as::<_, PhoneNumberConfig>(
        r#"
        SELECT id, company_id, name, forward_to_country_code, forward_to_number,
               greeting_enabled, greeting_message_type, greeting_message,
               greeting_audio_url, greeting_voice, greeting_language,
               keypad_enabled, keypad_answer, keypad_attempts, keypad_prompt,
               keypad_failure_message, whisper_enabled, whisper_message,
               recording_enabled, transcription_enabled, created_at
        FROM phone_number_configs
        WHERE id = $1
        "#
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}
