//! Contact database operations

use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{Contact, NewContact};

pub async fn get_by_number(
    conn: &mut PgConnection,
    company_id: i64,
    country_code: &str,
    number: &str,
) -> Result<Option<Contact>, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        r#"
        SELECT id, company_id, uuid, country_code, number, first_name, last_name,
               city, state, zip, country, created_at
        FROM contacts
        WHERE company_id = $1 AND country_code = $2 AND number = $3
        "#
    )
    .bind(company_id)
    .bind(country_code)
    .bind(number)
    .fetch_optional(conn)
    .await
}

/// Insert a contact; a concurrent insert for the same caller returns that row
pub async fn create(conn: &mut PgConnection, contact: NewContact) -> Result<Contact, sqlx::Error> {
    sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts (company_id, uuid, country_code, number, first_name, last_name,
                              city, state, zip, country, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (company_id, country_code, number)
        DO UPDATE SET number = EXCLUDED.number
        RETURNING id, company_id, uuid, country_code, number, first_name, last_name,
                  city, state, zip, country, created_at
        "#
    )
    .bind(contact.company_id)
    .bind(contact.uuid)
    .bind(&contact.country_code)
    .bind(&contact.number)
    .bind(&contact.first_name)
    .bind(&contact.last_name)
    .bind(&contact.city)
    .bind(&contact.state)
    .bind(&contact.zip)
    .bind(&contact.country)
    .bind(contact.created_at)
    .fetch_one(conn)
    .await
}

pub async fn set_uuid(conn: &mut PgConnection, id: i64, uuid: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE contacts SET uuid = $2 WHERE id = $1")
        .bind(id)
        .bind(uuid)
        .execute(conn)
        .await?;
    Ok(())
}
