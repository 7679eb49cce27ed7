use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockedPhoneNumber {
    pub id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    pub number: String,
    pub name: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Audit row written each time a blocked caller is rejected
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockedCall {
    pub id: i64,
    #[serde(rename = "blockedPhoneNumberId")]
    pub blocked_phone_number_id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "phoneNumberId")]
    pub phone_number_id: i64,
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBlockedCall {
    pub blocked_phone_number_id: i64,
    pub company_id: i64,
    pub phone_number_id: i64,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}
