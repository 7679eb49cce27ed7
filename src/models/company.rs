use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Tenant that owns numbers, pools and contacts
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    #[serde(rename = "accountId")]
    pub account_id: i64,
    pub name: String,
    #[serde(rename = "disabledAt")]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl Company {
    pub fn is_enabled(&self) -> bool {
        self.disabled_at.is_none()
    }
}
