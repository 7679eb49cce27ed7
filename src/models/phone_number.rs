use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::attribution::{AttributionSnapshot, Classification};

/// A tenant-owned dialable tracking number
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhoneNumber {
    pub id: i64,
    #[serde(rename = "companyId")]
    pub company_id: i64,
    #[serde(rename = "phoneNumberConfigId")]
    pub phone_number_config_id: Option<i64>,
    #[serde(rename = "keywordTrackingPoolId")]
    pub keyword_tracking_pool_id: Option<i64>,
    #[serde(rename = "countryCode")]
    pub country_code: String,
    pub number: String,
    pub name: String,
    pub source: String,
    pub medium: Option<String>,
    pub content: Option<String>,
    pub campaign: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub classification: Classification,
    /// Tenant-authored swap rules, parsed by the rule matcher
    #[serde(rename = "swapRules")]
    pub swap_rules: Option<serde_json::Value>,
    #[serde(rename = "disabledAt")]
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(rename = "deletedAt")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl PhoneNumber {
    pub fn e164(&self) -> String {
        format!("+{}{}", self.country_code, self.number)
    }

    pub fn is_active(&self) -> bool {
        self.disabled_at.is_none() && self.deleted_at.is_none()
    }

    pub fn is_pool_number(&self) -> bool {
        self.keyword_tracking_pool_id.is_some()
    }

    /// Static attribution of a flat (non-pool) number
    pub fn attribution(&self) -> AttributionSnapshot {
        AttributionSnapshot {
            source: self.source.clone(),
            medium: self.medium.clone(),
            content: self.content.clone(),
            campaign: self.campaign.clone(),
            keyword: None,
            classification: self.classification,
        }
    }
}
